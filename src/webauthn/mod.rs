//! # WebAuthn Module
//!
//! The two passkey ceremonies and the boundary they verify through.
//!
//! ## Submodules
//! - `types`: Endpoint payloads and the WebAuthn option/response types
//! - `registration`: Binding a new authenticator to an existing account
//! - `authentication`: Signing in with a discoverable passkey
//! - `verifier`: The `CredentialVerifier` trait and the counter rule
//! - `passkey_verifier`: The production verifier, backed by `webauthn-rs`
//!
//! ## Ceremony Flow
//! Both ceremonies move `Idle → OptionsIssued → Verified | Failed | Expired`:
//! 1. Options requested → the verifier mints a challenge and ceremony state,
//!    both stored for the subject
//! 2. Client signs the challenge with its authenticator
//! 3. Response submitted → challenge looked up, verifier consulted with the state
//! 4. Success consumes the challenge and updates the credential repository;
//!    failure leaves the stores untouched; an abandoned challenge expires

pub mod authentication;
pub mod passkey_verifier;
pub mod registration;
pub mod types;
pub mod verifier;

use std::time::Duration;

/// Client-side ceremony timeout hint, in milliseconds
fn timeout_millis(ttl: Duration) -> u32 {
    u32::try_from(ttl.as_millis()).unwrap_or(u32::MAX)
}
