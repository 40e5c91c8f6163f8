//! # Ceremony Handlers
//!
//! HTTP endpoints for the two passkey ceremonies plus logout and session
//! info. Registration needs a signed-in account. Authentication binds its
//! challenge to a per-attempt ceremony id kept in the session, and signs the
//! session in on success.
//!
//! ## Routes
//! - POST /api/passkeys/register/{start,finish}
//! - POST /api/passkeys/authenticate/{start,finish}
//! - POST /api/auth/logout
//! - GET /api/auth/session

use crate::db::accounts;
use crate::db::models::ChallengeNamespace;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{
    current_account_id, session_error, ACCOUNT_ID_KEY, CEREMONY_ID_KEY,
};
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{authentication, registration};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;
use uuid::Uuid;

// Registration endpoints (signed-in accounts only)

/// Creation options for the signed-in account
///
/// ## Route
/// POST /api/passkeys/register/start
///
/// The response body goes straight to `navigator.credentials.create()`.
pub async fn register_start(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<CreationChallengeResponse>> {
    let account_id = current_account_id(&session).await?;
    let account = accounts::find_by_id(&state.db, &account_id).await?;

    let options = registration::start_registration(&state, &account).await?;

    Ok(Json(options))
}

/// Verify the attestation and store the passkey under the signed-in account
///
/// ## Route
/// POST /api/passkeys/register/finish
///
/// ## Request Body
/// ```json
/// { "name": "YubiKey 5C", "credential": { "id": "...", "rawId": "...", "type": "public-key", "response": { ... } } }
/// ```
pub async fn register_finish(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegistrationFinishRequest>,
) -> AppResult<Json<CredentialView>> {
    let account_id = current_account_id(&session).await?;
    let account = accounts::find_by_id(&state.db, &account_id).await?;

    let credential =
        registration::finish_registration(&state, &account, &req.name, &req.credential).await?;

    Ok(Json(credential))
}

// Authentication endpoints

/// Request options for a discoverable sign-in
///
/// ## Route
/// POST /api/passkeys/authenticate/start
///
/// Mints a fresh ceremony id into the session. A challenge issued for the
/// id it replaces is deleted.
pub async fn authenticate_start(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<RequestChallengeResponse>> {
    // Transient id: nobody is known to be signing in yet
    let ceremony_id = Uuid::new_v4().to_string();
    let superseded: Option<String> = session
        .insert_value(CEREMONY_ID_KEY, serde_json::to_value(&ceremony_id)?)
        .await
        .map_err(session_error)?
        .and_then(|old| serde_json::from_value(old).ok());

    if let Some(old) = superseded {
        state
            .challenges
            .delete(ChallengeNamespace::Authentication, &old)
            .await?;
    }

    let options = authentication::start_authentication(&state, &ceremony_id).await?;

    Ok(Json(options))
}

/// Verify the assertion and sign the session in as the credential's owner
///
/// ## Route
/// POST /api/passkeys/authenticate/finish
///
/// The session id is rotated before the account is attached.
pub async fn authenticate_finish(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<AuthenticationFinishRequest>,
) -> AppResult<Json<AuthenticatedAccount>> {
    // One attempt per ceremony: whatever the outcome, the client starts over
    let ceremony_id: String = session
        .remove(CEREMONY_ID_KEY)
        .await
        .map_err(session_error)?
        .ok_or(AppError::MissingChallenge)?;

    let authenticated =
        authentication::finish_authentication(&state, &ceremony_id, &req.credential).await?;

    // New session id on privilege change (session fixation)
    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(ACCOUNT_ID_KEY, &authenticated.account.id)
        .await
        .map_err(session_error)?;

    Ok(Json(authenticated))
}

/// Drop any pending ceremony and clear the session
///
/// ## Route
/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, session: Session) -> AppResult<Json<Value>> {
    let pending: Option<String> = session.get(CEREMONY_ID_KEY).await.map_err(session_error)?;
    if let Some(ceremony_id) = pending {
        state
            .challenges
            .delete(ChallengeNamespace::Authentication, &ceremony_id)
            .await?;
    }

    session.flush().await.map_err(session_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}

/// GET /api/auth/session
pub async fn session_info(session: Session) -> AppResult<Json<Value>> {
    let account_id: Option<String> = session.get(ACCOUNT_ID_KEY).await.map_err(session_error)?;

    match account_id {
        Some(id) => Ok(Json(json!({
            "authenticated": true,
            "account_id": id
        }))),
        None => Ok(Json(json!({
            "authenticated": false
        }))),
    }
}
