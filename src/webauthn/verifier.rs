//! # Credential Verifier
//!
//! The capability boundary that performs the public-key side of a ceremony.
//! Starting a ceremony yields the options for the browser plus a
//! [`PendingCeremony`]: the challenge and the serialized state needed to
//! check the response later. The ceremonies park both in the challenge
//! store and hand the state back when the response arrives.
//!
//! Everything the ceremonies persist about a credential is opaque text
//! produced here; only the signature counter is tracked outside of it.

use crate::db::models::{Account, DeviceType};
use crate::error::AppError;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;
use webauthn_rs_proto::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

/// A ceremony that has been started but not finished
#[derive(Debug, Clone)]
pub struct PendingCeremony {
    /// Challenge sent to the browser
    pub challenge: Vec<u8>,
    /// Serialized verifier state, returned to `verify_*` unchanged
    pub state: String,
}

/// The registered authenticator an assertion claims to come from
#[derive(Debug, Clone)]
pub struct StoredAuthenticator {
    /// Serialized credential as produced by `verify_registration`
    pub passkey: String,
    /// Authoritative counter, read from the credential repository
    pub sign_count: u32,
    /// Account the credential belongs to; the assertion's `userHandle` must name it
    pub user_handle: Uuid,
}

/// Facts established by a verified attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRegistration {
    /// Taken from the attested credential data, never from the client's `rawId`
    pub credential_id: Vec<u8>,
    pub passkey: String,
    pub sign_count: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
}

/// Facts established by a verified assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAuthentication {
    /// Counter reported by the authenticator, already checked against the stored one
    pub sign_count: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Signature, origin, RP ID, challenge, user handle or format mismatch
    #[error("{0}")]
    Rejected(String),

    #[error("signature counter does not advance stored counter {stored}")]
    CounterRegression { stored: u32 },

    /// Corrupt stored state or a library failure unrelated to the response
    #[error("{0}")]
    Internal(String),
}

impl VerifyError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        VerifyError::Rejected(reason.into())
    }
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Rejected(reason) => AppError::VerificationFailed(reason),
            VerifyError::CounterRegression { .. } => AppError::PossibleCloneDetected,
            VerifyError::Internal(reason) => AppError::Internal(reason),
        }
    }
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Creation options for `account`, excluding the credential ids it already has
    async fn start_registration(
        &self,
        account: &Account,
        exclude: Vec<Vec<u8>>,
    ) -> Result<(CreationChallengeResponse, PendingCeremony), VerifyError>;

    async fn verify_registration(
        &self,
        state: &str,
        response: &RegisterPublicKeyCredential,
    ) -> Result<VerifiedRegistration, VerifyError>;

    /// Request options without an allow-list, for discoverable credentials
    async fn start_authentication(
        &self,
    ) -> Result<(RequestChallengeResponse, PendingCeremony), VerifyError>;

    /// Implementations must enforce [`counter_advances`]
    async fn verify_authentication(
        &self,
        state: &str,
        stored: &StoredAuthenticator,
        response: &PublicKeyCredential,
    ) -> Result<VerifiedAuthentication, VerifyError>;
}

/// Signature counter anti-cloning rule
///
/// The reported counter must exceed the stored one. Zero after zero is the
/// one exception: some authenticators never implement a counter.
pub fn counter_advances(stored: u32, reported: u32) -> bool {
    reported > stored || (stored == 0 && reported == 0)
}
