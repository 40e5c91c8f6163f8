//! # Passkey Ceremony Server
//!
//! Relying-party side of WebAuthn: issues registration and authentication
//! challenges, verifies what the authenticator sends back, stores passkeys
//! and refuses assertions whose signature counter doesn't advance.
//!
//! ## Key Concepts
//! - **Ceremony**: one start/finish round trip bound to a single-use challenge
//! - **Discoverable credential**: a passkey the authenticator can offer
//!   without being told which account is signing in
//! - **Signature counter**: per-credential counter used to spot cloned keys

mod config; // Environment configuration and relying party settings
mod db; // Accounts, credentials, challenges
mod error; // Error taxonomy and HTTP mapping
mod events; // Ceremony event channel
mod handlers; // HTTP routes
mod middleware; // Session authentication check
mod state; // Shared application state
mod webauthn; // Ceremonies and credential verification

#[cfg(test)]
mod test_support;

use crate::config::Config;
use crate::handlers::accounts::{create_account, get_current_account};
use crate::handlers::auth::*;
use crate::handlers::credentials::{list_credentials, revoke_credential};
use crate::handlers::health::health_check;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_ceremony_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(
        rp_id = %app_state.relying_party.id,
        origin = %app_state.relying_party.origin,
        "Application state initialized"
    );

    // Expired challenges are already ignored on read; this only reclaims rows
    let challenges = app_state.challenges.clone();
    let reap_interval = config.challenge_reap_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reap_interval);
        loop {
            interval.tick().await;
            match challenges.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Expired challenges purged"),
                Err(e) => tracing::error!("Challenge purge failed: {:?}", e),
            }
        }
    });

    tokio::spawn(events::log_events(app_state.events.subscribe()));

    let session_store = SqliteStore::new(app_state.db.clone());
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected_routes = Router::new()
        .route("/api/accounts/me", get(get_current_account))
        .route("/api/passkeys", get(list_credentials))
        .route("/api/passkeys/{credential_id}", delete(revoke_credential))
        .route("/api/passkeys/register/start", post(register_start))
        .route("/api/passkeys/register/finish", post(register_finish))
        .layer(axum_middleware::from_fn(middleware::auth::require_auth));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/accounts", post(create_account))
        .route("/api/passkeys/authenticate/start", post(authenticate_start))
        .route("/api/passkeys/authenticate/finish", post(authenticate_finish))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session_info))
        .merge(protected_routes)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
