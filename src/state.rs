//! # Application State
//!
//! Shared resources handed to every request handler. Axum clones the state
//! per request; every field is a pool, an `Arc` or a broadcast sender, so
//! cloning is cheap.
//!
//! The challenge store and credential repository are explicit instances
//! built here, never process-wide singletons.

use crate::config::{ChallengeTtls, Config, RelyingParty};
use crate::db::challenges::ChallengeStore;
use crate::db::credentials::CredentialRepository;
use crate::events::{self, CeremonyEvent};
use crate::webauthn::passkey_verifier::PasskeyVerifier;
use crate::webauthn::verifier::CredentialVerifier;
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (accounts, sessions)
    pub db: SqlitePool,

    /// Outstanding ceremony challenges
    pub challenges: ChallengeStore,

    /// Registered passkeys
    pub credentials: CredentialRepository,

    /// Performs the cryptographic checks of both ceremonies
    pub verifier: Arc<dyn CredentialVerifier>,

    /// Name, ID and origin every ceremony is bound to
    pub relying_party: Arc<RelyingParty>,

    pub ttls: ChallengeTtls,

    /// Registration, authentication and clone-detection events
    pub events: broadcast::Sender<CeremonyEvent>,
}

impl AppState {
    /// Connect to the database, run migrations and wire the passkey verifier
    ///
    /// # Errors
    /// Returns an error if the database connection or migrations fail, or
    /// the relying party origin is invalid.
    pub async fn new(config: &Config) -> Result<Self> {
        let relying_party = config.relying_party()?;
        let verifier = PasskeyVerifier::new(&relying_party)?;

        let db = SqlitePool::connect(&config.database_url).await?;

        // Embeds ./migrations at compile time; applied migrations are tracked
        sqlx::migrate!("./migrations").run(&db).await?;

        Ok(Self::from_parts(
            db,
            relying_party,
            config.challenge_ttls(),
            Arc::new(verifier),
        ))
    }

    pub fn from_parts(
        db: SqlitePool,
        relying_party: RelyingParty,
        ttls: ChallengeTtls,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        AppState {
            challenges: ChallengeStore::new(db.clone()),
            credentials: CredentialRepository::new(db.clone()),
            db,
            verifier,
            relying_party: Arc::new(relying_party),
            ttls,
            events: events::channel(),
        }
    }
}
