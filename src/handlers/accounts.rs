//! # Account Handlers
//!
//! Account bootstrap and profile lookup. Creating an account signs the
//! caller in so the first passkey can be registered.

use crate::db::accounts;
use crate::db::models::Account;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{current_account_id, session_error, ACCOUNT_ID_KEY};
use crate::state::AppState;
use crate::webauthn::types::CreateAccountRequest;
use axum::{extract::State, http::StatusCode, Json};
use tower_sessions::Session;

const MAX_USERNAME_LEN: usize = 64;

/// Create an account and sign in as it
///
/// ## Route
/// POST /api/accounts
///
/// ## Request Body
/// ```json
/// { "username": "alice", "display_name": "Alice Smith" }
/// ```
pub async fn create_account(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<Account>)> {
    let username = req.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }

    let display_name = match req.display_name.trim() {
        "" => username,
        name => name,
    };

    let account = accounts::create_account(&state.db, username, display_name).await?;

    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(ACCOUNT_ID_KEY, &account.id)
        .await
        .map_err(session_error)?;

    tracing::info!(account_id = %account.id, "Account created");

    Ok((StatusCode::CREATED, Json(account)))
}

/// Profile of the signed-in account
///
/// ## Route
/// GET /api/accounts/me
pub async fn get_current_account(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Account>> {
    let account_id = current_account_id(&session).await?;
    let account = accounts::find_by_id(&state.db, &account_id).await?;

    Ok(Json(account))
}
