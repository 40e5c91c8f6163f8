//! Shared fixtures for unit tests: an in-memory database and a software
//! authenticator that produces real ES256 attestations and assertions.

use crate::config::{ChallengeTtls, RelyingParty};
use crate::state::AppState;
use crate::webauthn::passkey_verifier::PasskeyVerifier;
use crate::webauthn::types::decode_base64url;
use base64::prelude::*;
use ciborium::value::Value;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tower_sessions::{MemoryStore, Session};
use webauthn_rs_proto::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

pub const TEST_ORIGIN: &str = "https://passkeys.example.com";
pub const TEST_RP_ID: &str = "passkeys.example.com";

/// A single connection keeps every query on the same in-memory database
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub fn test_relying_party() -> RelyingParty {
    RelyingParty::new("Passkey Tests", TEST_ORIGIN).expect("valid origin")
}

pub fn test_verifier() -> PasskeyVerifier {
    PasskeyVerifier::new(&test_relying_party()).expect("valid relying party")
}

pub async fn test_state() -> AppState {
    test_state_with_ttls(ChallengeTtls::default()).await
}

pub async fn test_state_with_ttls(ttls: ChallengeTtls) -> AppState {
    AppState::from_parts(
        memory_pool().await,
        test_relying_party(),
        ttls,
        Arc::new(test_verifier()),
    )
}

/// Fresh, unsaved session backed by an in-memory store
pub fn memory_session() -> Session {
    Session::new(None, Arc::new(MemoryStore::default()), None)
}

const UP: u8 = 0x01;
const UV: u8 = 0x04;
const BE: u8 = 0x08;
const BS: u8 = 0x10;
const AT: u8 = 0x40;

fn b64(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Base64url field of serialized options, e.g. `["publicKey"]["challenge"]`
fn options_bytes(options: &impl Serialize, path: &[&str]) -> Vec<u8> {
    let value = serde_json::to_value(options).expect("serializable options");
    let field = path
        .iter()
        .fold(&value, |value, key| &value[*key])
        .as_str()
        .expect("base64url field");
    decode_base64url(field).expect("base64url")
}

/// Authenticator holding one discoverable P-256 credential
///
/// Remembers the user handle from the options it registered with and
/// returns it in assertions, like a platform authenticator does.
pub struct SoftAuthenticator {
    credential_id: Vec<u8>,
    reported_id: Option<Vec<u8>>,
    signing_key: SigningKey,
    flags: u8,
    attested: bool,
    origin: String,
    rp_id: String,
    user_handle: Mutex<Option<Vec<u8>>>,
}

impl SoftAuthenticator {
    /// A synced passkey (backup eligible and backed up)
    pub fn new(credential_id: &[u8]) -> Self {
        SoftAuthenticator {
            credential_id: credential_id.to_vec(),
            reported_id: None,
            signing_key: SigningKey::random(&mut OsRng),
            flags: UP | UV | BE | BS,
            attested: true,
            origin: TEST_ORIGIN.to_string(),
            rp_id: TEST_RP_ID.to_string(),
            user_handle: Mutex::new(None),
        }
    }

    /// A hardware key that can't be backed up
    pub fn single_device(mut self) -> Self {
        self.flags = UP | UV;
        self
    }

    /// Pretend the browser is on another site
    pub fn at_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    /// Report `id` as `id`/`rawId` while attesting the real credential id
    pub fn reporting_raw_id(mut self, id: &[u8]) -> Self {
        self.reported_id = Some(id.to_vec());
        self
    }

    /// Registration authenticator data stops after the counter (no AT flag)
    pub fn omit_attested_credential(mut self) -> Self {
        self.attested = false;
        self
    }

    pub fn with_user_handle(self, user_handle: &[u8]) -> Self {
        *self.user_handle.lock().unwrap() = Some(user_handle.to_vec());
        self
    }

    fn reported_id(&self) -> String {
        b64(self.reported_id.as_deref().unwrap_or(&self.credential_id))
    }

    fn client_data(&self, kind: &str, challenge: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": kind,
            "challenge": b64(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .expect("json")
    }

    fn authenticator_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    /// COSE_Key for EC2 / ES256 / P-256
    fn cose_public_key(&self) -> Vec<u8> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let xy = point.as_bytes();
        let int = |i: i64| Value::Integer(i.into());
        let key = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(xy[1..33].to_vec())),
            (int(-3), Value::Bytes(xy[33..65].to_vec())),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&key, &mut out).expect("cbor");
        out
    }

    fn attestation_object(&self, counter: u32) -> Vec<u8> {
        let mut auth_data = if self.attested {
            self.authenticator_data(self.flags | AT, counter)
        } else {
            self.authenticator_data(self.flags, counter)
        };
        if self.attested {
            auth_data.extend_from_slice(&[0u8; 16]);
            auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            auth_data.extend_from_slice(&self.credential_id);
            auth_data.extend_from_slice(&self.cose_public_key());
        }

        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&object, &mut out).expect("cbor");
        out
    }

    /// Answer `navigator.credentials.create()` for `options`
    pub fn register(
        &self,
        options: &CreationChallengeResponse,
        counter: u32,
    ) -> RegisterPublicKeyCredential {
        let challenge = options_bytes(options, &["publicKey", "challenge"]);
        let user_handle = options_bytes(options, &["publicKey", "user", "id"]);
        *self.user_handle.lock().unwrap() = Some(user_handle);

        serde_json::from_value(json!({
            "id": self.reported_id(),
            "rawId": self.reported_id(),
            "type": "public-key",
            "response": {
                "clientDataJSON": b64(&self.client_data("webauthn.create", &challenge)),
                "attestationObject": b64(&self.attestation_object(counter)),
                "transports": ["internal", "hybrid"],
            },
            "extensions": {},
        }))
        .expect("registration response")
    }

    /// Answer `navigator.credentials.get()` for `options`
    pub fn assert(&self, options: &RequestChallengeResponse, counter: u32) -> PublicKeyCredential {
        self.assert_challenge(&options_bytes(options, &["publicKey", "challenge"]), counter)
    }

    pub fn assert_challenge(&self, challenge: &[u8], counter: u32) -> PublicKeyCredential {
        let client_data_json = self.client_data("webauthn.get", challenge);
        let authenticator_data = self.authenticator_data(self.flags, counter);

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data_json));
        let signature: Signature = self.signing_key.sign(&signed);
        let user_handle = self.user_handle.lock().unwrap().as_deref().map(b64);

        serde_json::from_value(json!({
            "id": self.reported_id(),
            "rawId": self.reported_id(),
            "type": "public-key",
            "response": {
                "clientDataJSON": b64(&client_data_json),
                "authenticatorData": b64(&authenticator_data),
                "signature": b64(signature.to_der().as_bytes()),
                "userHandle": user_handle,
            },
            "extensions": {},
        }))
        .expect("assertion response")
    }
}
