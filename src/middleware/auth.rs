//! # Session Authentication
//!
//! The session keys the handlers share, and the guard in front of the
//! routes that need a signed-in account. A session is signed in once it
//! carries an account id under [`ACCOUNT_ID_KEY`].

use crate::error::{AppError, AppResult};
use axum::{extract::Request, middleware::Next, response::Response};
use tower_sessions::Session;

/// Session key holding the signed-in account id
pub const ACCOUNT_ID_KEY: &str = "account_id";

/// Session key holding the id of the authentication ceremony in flight
pub const CEREMONY_ID_KEY: &str = "authentication_ceremony";

/// Maps a session store failure to `Internal`
pub fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("Session error: {}", e))
}

/// Account id of the signed-in user
///
/// ## Errors
/// `Unauthorized` when the session is not signed in.
pub async fn current_account_id(session: &Session) -> AppResult<String> {
    session
        .get::<String>(ACCOUNT_ID_KEY)
        .await
        .map_err(session_error)?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
}

/// Middleware rejecting requests without a signed-in session
///
/// ## Usage
/// ```ignore
/// Router::new()
///     .route("/api/passkeys", get(list_credentials))
///     .layer(axum::middleware::from_fn(require_auth));
/// ```
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    current_account_id(&session).await?;
    Ok(next.run(request).await)
}
