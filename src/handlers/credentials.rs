//! # Credential Handlers
//!
//! Lets a signed-in account see and revoke its own passkeys. Public keys
//! never leave the server.

use crate::error::{AppError, AppResult};
use crate::middleware::auth::current_account_id;
use crate::state::AppState;
use crate::webauthn::types::{decode_base64url, CredentialView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tower_sessions::Session;

/// GET /api/passkeys
pub async fn list_credentials(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<CredentialView>>> {
    let account_id = current_account_id(&session).await?;
    let credentials = state.credentials.list_by_account(&account_id).await?;

    Ok(Json(credentials.iter().map(CredentialView::from).collect()))
}

/// DELETE /api/passkeys/{credential_id}
///
/// `credential_id` is the base64url credential id. Another account's
/// credential is reported as not found.
pub async fn revoke_credential(
    State(state): State<AppState>,
    session: Session,
    Path(credential_id): Path<String>,
) -> AppResult<StatusCode> {
    let account_id = current_account_id(&session).await?;
    let id = decode_base64url(&credential_id)
        .map_err(|_| AppError::BadRequest("Malformed credential id".to_string()))?;

    if !state.credentials.delete(&account_id, &id).await? {
        return Err(AppError::NotFound(format!(
            "Passkey '{}' not found",
            credential_id
        )));
    }

    tracing::info!(account_id = %account_id, credential_id = %credential_id, "Passkey revoked");

    Ok(StatusCode::NO_CONTENT)
}
