//! # Error Handling
//!
//! Application error type and its conversion into HTTP responses.
//!
//! Ceremony failures are reported to clients as opaque categories such as
//! `{"error": "missing_challenge"}`. The detail behind a failure (challenge
//! bytes, public keys, the verifier's reason) only ever reaches the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
///
/// The first five variants are the ceremony failure taxonomy. Each one is
/// terminal for the ceremony attempt: the client must request fresh options.
#[derive(Error, Debug)]
pub enum AppError {
    /// No live challenge for the subject: expired, already consumed, or never issued
    #[error("No live challenge for this ceremony")]
    MissingChallenge,

    /// The assertion names a credential id that isn't registered
    #[error("Unknown credential")]
    UnknownCredential,

    /// Signature, origin, RP ID or challenge mismatch reported by the verifier
    #[error("Credential verification failed: {0}")]
    VerificationFailed(String),

    /// Signature counter didn't advance past the stored value
    #[error("Signature counter regression, possible cloned authenticator")]
    PossibleCloneDetected,

    /// Registration names a credential id that is already stored
    #[error("Credential is already registered")]
    DuplicateCredential,

    /// Database errors (SQLx library errors)
    ///
    /// `#[from]` lets `?` convert `sqlx::Error` into `AppError::Database`
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User is not logged in or the session has expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable category string returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingChallenge => "missing_challenge",
            AppError::UnknownCredential => "unknown_credential",
            AppError::VerificationFailed(_) => "verification_failed",
            AppError::PossibleCloneDetected => "possible_clone_detected",
            AppError::DuplicateCredential => "duplicate_credential",
            AppError::Database(_) => "database_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingChallenge => StatusCode::BAD_REQUEST,
            AppError::UnknownCredential
            | AppError::VerificationFailed(_)
            | AppError::PossibleCloneDetected
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DuplicateCredential => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert AppError into an HTTP response
///
/// Details are logged server-side; the body carries the category and, for
/// the variants whose message is written for users, that message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                None
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                None
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                None
            }
            AppError::VerificationFailed(reason) => {
                tracing::info!("Credential verification failed: {}", reason);
                None
            }
            AppError::PossibleCloneDetected => {
                tracing::warn!("Rejected assertion with non-increasing signature counter");
                None
            }
            AppError::MissingChallenge
            | AppError::UnknownCredential
            | AppError::DuplicateCredential => {
                tracing::debug!("Ceremony failed: {}", self);
                None
            }
            AppError::NotFound(_) | AppError::BadRequest(_) | AppError::Unauthorized(_) => {
                Some(self.to_string())
            }
        };

        let body = match message {
            Some(message) => json!({ "error": self.code(), "message": message }),
            None => json!({ "error": self.code() }),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// `Result` alias used throughout the crate
pub type AppResult<T> = Result<T, AppError>;
