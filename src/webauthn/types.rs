//! # WebAuthn API Types
//!
//! Request/response types for the ceremony endpoints. Options and client
//! responses are the `webauthn-rs-proto` types, which follow the shapes
//! `navigator.credentials.create()` / `.get()` use.
//!
//! Binary fields travel as base64url without padding.

use crate::db::models::{Account, DeviceType, PasskeyCredential};
use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use webauthn_rs_proto::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

/// Decode base64url, tolerating padding and the standard alphabet
///
/// Browsers and client libraries are not consistent about either.
pub fn decode_base64url(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = raw
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    BASE64_URL_SAFE_NO_PAD.decode(normalized.as_bytes())
}

/// Bytes that serialize as a base64url string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64Url(pub Vec<u8>);

impl Base64Url {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Base64Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl Serialize for Base64Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        decode_base64url(&raw)
            .map(Base64Url)
            .map_err(serde::de::Error::custom)
    }
}

// Endpoint payloads

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub display_name: String,
}

/// Sent after `navigator.credentials.create()` resolves
///
/// ## Example JSON
/// ```json
/// {
///   "name": "YubiKey 5C",
///   "credential": { "id": "...", "rawId": "...", "type": "public-key", "response": { ... } }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct RegistrationFinishRequest {
    /// Label the user gives the new authenticator
    pub name: String,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticationFinishRequest {
    pub credential: PublicKeyCredential,
}

/// A stored credential as callers see it: everything except the public key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialView {
    pub id: Base64Url,
    pub name: String,
    pub sign_count: i64,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl From<&PasskeyCredential> for CredentialView {
    fn from(credential: &PasskeyCredential) -> Self {
        CredentialView {
            id: Base64Url(credential.id.clone()),
            name: credential.name.clone(),
            sign_count: credential.sign_count,
            device_type: credential.device_type,
            backed_up: credential.backed_up,
            transports: credential.transport_hints(),
            created_at: credential.created_at.clone(),
            last_used_at: credential.last_used_at.clone(),
        }
    }
}

/// Successful authentication: the resolved account and the credential used
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthenticatedAccount {
    pub account: Account,
    pub credential: CredentialView,
}
