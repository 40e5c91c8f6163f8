//! # Database Module
//!
//! - `models`: Row types (Account, PasskeyCredential, ChallengeEntry)
//! - `accounts`: Lookups and creation of accounts
//! - `credentials`: The credential repository
//! - `challenges`: The challenge store (registration & authentication)

pub mod accounts;
pub mod challenges;
pub mod credentials;
pub mod models;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 (microseconds, `Z` suffix)
///
/// Every stored timestamp goes through this so that `expires_at > ?`
/// comparisons in SQL are correct as plain string comparisons.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
