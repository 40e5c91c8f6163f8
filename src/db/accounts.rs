//! # Account Storage
//!
//! Accounts own passkeys. Usernames are unique; ids are UUIDs, and their
//! bytes are the WebAuthn user handle.

use crate::db::models::Account;
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;

/// Insert a new account with a fresh id
///
/// ## Errors
/// `BadRequest` if the username is taken.
pub async fn create_account(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
) -> AppResult<Account> {
    let account = Account::new(username.to_string(), display_name.to_string());

    sqlx::query(
        "INSERT INTO accounts (id, username, display_name, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&account.id)
    .bind(&account.username)
    .bind(&account.display_name)
    .bind(&account.created_at)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::BadRequest(format!("Username '{}' is already taken", username))
        }
        _ => AppError::Database(e),
    })?;

    Ok(account)
}

/// Fetch an account by id, `NotFound` if there is none
pub async fn find_by_id(pool: &SqlitePool, account_id: &str) -> AppResult<Account> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                AppError::NotFound(format!("Account with id '{}' not found", account_id))
            }
            _ => AppError::Database(e),
        })?;

    Ok(account)
}
