//! # Credential Repository
//!
//! Durable store of registered passkeys, keyed by credential id and indexed
//! by owning account.
//!
//! ## Security Note
//! Only public keys are stored (inside the serialized passkey); private keys
//! never leave the user's device.

use crate::db::format_timestamp;
use crate::db::models::{NewCredential, PasskeyCredential};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a credential by id; the row names its owning account
    pub async fn find_by_id(&self, credential_id: &[u8]) -> AppResult<Option<PasskeyCredential>> {
        let credential = sqlx::query_as::<_, PasskeyCredential>(
            "SELECT * FROM passkey_credentials WHERE id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    /// All credentials of an account, oldest first
    pub async fn list_by_account(&self, account_id: &str) -> AppResult<Vec<PasskeyCredential>> {
        let credentials = sqlx::query_as::<_, PasskeyCredential>(
            "SELECT * FROM passkey_credentials WHERE account_id = ? ORDER BY created_at, rowid",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(credentials)
    }

    /// Insert a verified credential
    ///
    /// Credential ids are unique across all accounts; a second insert of the
    /// same id fails with `DuplicateCredential` whoever owns the first.
    pub async fn insert(&self, new: NewCredential) -> AppResult<PasskeyCredential> {
        let transports = if new.transports.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&new.transports)?)
        };

        let credential = PasskeyCredential {
            id: new.id,
            account_id: new.account_id,
            name: new.name,
            passkey: new.passkey,
            sign_count: i64::from(new.sign_count),
            device_type: new.device_type,
            backed_up: new.backed_up,
            transports,
            created_at: format_timestamp(Utc::now()),
            last_used_at: None,
        };

        sqlx::query(
            "INSERT INTO passkey_credentials
             (id, account_id, name, passkey, sign_count, device_type, backed_up, transports, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.id)
        .bind(&credential.account_id)
        .bind(&credential.name)
        .bind(&credential.passkey)
        .bind(credential.sign_count)
        .bind(credential.device_type)
        .bind(credential.backed_up)
        .bind(&credential.transports)
        .bind(&credential.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DuplicateCredential
            }
            _ => AppError::Database(e),
        })?;

        Ok(credential)
    }

    /// Commit a new signature counter and last-used time
    ///
    /// A single conditional `UPDATE`: the row only changes if the new counter
    /// is strictly greater than the committed one, or both are zero
    /// (authenticators that don't implement a counter). Two racing requests
    /// that both read an older counter can't both commit, and the stored
    /// counter never moves backwards.
    ///
    /// ## Errors
    /// - `PossibleCloneDetected`: the condition failed
    /// - `UnknownCredential`: the credential was revoked in the meantime
    pub async fn update_counter_and_last_used(
        &self,
        credential_id: &[u8],
        new_counter: u32,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let new_counter = i64::from(new_counter);

        let result = sqlx::query(
            "UPDATE passkey_credentials
             SET sign_count = ?, last_used_at = ?
             WHERE id = ? AND (sign_count < ? OR (sign_count = 0 AND ? = 0))",
        )
        .bind(new_counter)
        .bind(format_timestamp(now))
        .bind(credential_id)
        .bind(new_counter)
        .bind(new_counter)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.find_by_id(credential_id).await? {
            Some(_) => Err(AppError::PossibleCloneDetected),
            None => Err(AppError::UnknownCredential),
        }
    }

    /// Revoke a credential; only its owner may do so
    ///
    /// Returns whether a row was deleted.
    pub async fn delete(&self, account_id: &str, credential_id: &[u8]) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM passkey_credentials WHERE id = ? AND account_id = ?")
            .bind(credential_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
