//! # Challenge Store
//!
//! Ephemeral challenges keyed by `(namespace, subject_id)`, backed by the
//! `ceremony_challenges` table.
//!
//! An expired row is logically gone the moment it expires: every read
//! filters on `expires_at`, and `purge_expired` only reclaims space.

use crate::db::format_timestamp;
use crate::db::models::{ChallengeEntry, ChallengeNamespace};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ChallengeStore {
    pool: SqlitePool,
}

impl ChallengeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a challenge and the ceremony state that verifies its response,
    /// superseding any entry the subject already has
    ///
    /// ## Errors
    /// `Internal` if `ttl` pushes the expiry past what a timestamp can hold.
    pub async fn put(
        &self,
        namespace: ChallengeNamespace,
        subject_id: &str,
        challenge: &[u8],
        state: &str,
        ttl: Duration,
    ) -> AppResult<ChallengeEntry> {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AppError::Internal("Challenge TTL out of range".to_string()))?;

        let entry = ChallengeEntry {
            namespace: namespace.as_str().to_string(),
            subject_id: subject_id.to_string(),
            challenge: challenge.to_vec(),
            state: state.to_string(),
            created_at: format_timestamp(now),
            expires_at: format_timestamp(expires_at),
        };

        sqlx::query(
            "INSERT INTO ceremony_challenges (namespace, subject_id, challenge, state, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (namespace, subject_id) DO UPDATE SET
                 challenge = excluded.challenge,
                 state = excluded.state,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
        )
        .bind(&entry.namespace)
        .bind(&entry.subject_id)
        .bind(&entry.challenge)
        .bind(&entry.state)
        .bind(&entry.created_at)
        .bind(&entry.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(%namespace, subject_id, expires_at = %entry.expires_at, "Challenge stored");
        Ok(entry)
    }

    /// Fetch the live entry for a subject, if there is one
    pub async fn get(
        &self,
        namespace: ChallengeNamespace,
        subject_id: &str,
    ) -> AppResult<Option<ChallengeEntry>> {
        let now = format_timestamp(Utc::now());

        let entry = sqlx::query_as::<_, ChallengeEntry>(
            "SELECT * FROM ceremony_challenges
             WHERE namespace = ? AND subject_id = ? AND expires_at > ?",
        )
        .bind(namespace.as_str())
        .bind(subject_id)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Atomically remove the entry if it still holds `challenge` and is live
    ///
    /// Returns `false` when another request consumed it first, a newer
    /// ceremony superseded it, or it expired since it was read.
    pub async fn consume(
        &self,
        namespace: ChallengeNamespace,
        subject_id: &str,
        challenge: &[u8],
    ) -> AppResult<bool> {
        let now = format_timestamp(Utc::now());

        let result = sqlx::query(
            "DELETE FROM ceremony_challenges
             WHERE namespace = ? AND subject_id = ? AND challenge = ? AND expires_at > ?",
        )
        .bind(namespace.as_str())
        .bind(subject_id)
        .bind(challenge)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, namespace: ChallengeNamespace, subject_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM ceremony_challenges WHERE namespace = ? AND subject_id = ?")
            .bind(namespace.as_str())
            .bind(subject_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Physically delete expired rows (run periodically)
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let now = format_timestamp(Utc::now());

        let result = sqlx::query("DELETE FROM ceremony_challenges WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
