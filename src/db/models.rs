//! # Database Models
//!
//! Structs mapping to the rows of `accounts`, `passkey_credentials` and
//! `ceremony_challenges`.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (see
//! [`crate::db::format_timestamp`]) so SQL string comparison orders them
//! correctly.

use crate::db::format_timestamp;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account a credential belongs to
///
/// Accounts are owned by account management; the ceremonies only read the
/// id, the public username and the display name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq, Eq)]
pub struct Account {
    /// UUID v4, e.g. "550e8400-e29b-41d4-a716-446655440000"
    pub id: String,

    /// Unique public username, used as the WebAuthn `user.name`
    pub username: String,

    /// Shown by the authenticator while creating a passkey
    pub display_name: String,

    pub created_at: String,
}

impl Account {
    pub fn new(username: String, display_name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            display_name,
            created_at: format_timestamp(Utc::now()),
        }
    }
}

/// Device classification reported by the authenticator at registration
///
/// Derived from the backup-eligible flag: a credential that may be synced
/// (iCloud Keychain, Google Password Manager) is multi-device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    SingleDevice,
    MultiDevice,
}

/// Passkey credential row
///
/// ## Invariants
/// - `id` is the primary key and never changes; a credential belongs to one account for life
/// - `passkey`, `device_type` and `created_at` are written once at registration
/// - `sign_count` only moves forward (see `CredentialRepository::update_counter_and_last_used`)
///
/// Only the PUBLIC key is stored. The private key never leaves the authenticator.
#[derive(Debug, Clone, sqlx::FromRow, PartialEq, Eq)]
pub struct PasskeyCredential {
    /// Credential id chosen by the authenticator (opaque bytes)
    pub id: Vec<u8>,

    /// Owning account
    pub account_id: String,

    /// Label the user gave this authenticator, e.g. "YubiKey 5C"
    pub name: String,

    /// Serialized `webauthn_rs::prelude::Passkey`: the COSE public key and
    /// the flags seen at registration. Its counter is not kept current;
    /// `sign_count` is authoritative.
    pub passkey: String,

    /// Last committed signature counter (a u32 on the wire)
    pub sign_count: i64,

    pub device_type: DeviceType,

    /// Whether the authenticator reports the credential as backed up
    pub backed_up: bool,

    /// Transport hints as a JSON array, e.g. `["internal","hybrid"]`
    pub transports: Option<String>,

    pub created_at: String,

    /// Updated on every successful authentication
    pub last_used_at: Option<String>,
}

impl PasskeyCredential {
    /// Stored counter as the u32 authenticators report
    pub fn signature_counter(&self) -> AppResult<u32> {
        u32::try_from(self.sign_count).map_err(|_| {
            AppError::Internal(format!("Stored signature counter {} out of range", self.sign_count))
        })
    }

    /// Decoded transport hints; advisory, so malformed JSON reads as none
    pub fn transport_hints(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Everything needed to insert a freshly verified credential
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub id: Vec<u8>,
    pub account_id: String,
    pub name: String,
    pub passkey: String,
    pub sign_count: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
}

/// Separates the two ceremony kinds so a session id can never collide with
/// an account id in the challenge table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeNamespace {
    Registration,
    Authentication,
}

impl ChallengeNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeNamespace::Registration => "registration",
            ChallengeNamespace::Authentication => "authentication",
        }
    }
}

impl std::fmt::Display for ChallengeNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outstanding ceremony challenge
///
/// ## Challenge Lifecycle
/// 1. Options issued → entry written (overwriting any earlier one for the subject)
/// 2. Client signs the challenge with its authenticator
/// 3. Response verified → entry consumed (deleted)
/// 4. Abandoned → entry expires and is eventually reaped
///
/// Entries are never updated in place.
#[derive(Debug, Clone, sqlx::FromRow, PartialEq, Eq)]
pub struct ChallengeEntry {
    pub namespace: String,

    /// Account id for registration, ceremony session id for authentication
    pub subject_id: String,

    /// Random bytes the authenticator must sign
    pub challenge: Vec<u8>,

    /// Serialized webauthn-rs ceremony state (`PasskeyRegistration` or
    /// `DiscoverableAuthentication`) that verifies the response
    pub state: String,

    pub created_at: String,

    /// After this instant the entry is treated as absent
    pub expires_at: String,
}
