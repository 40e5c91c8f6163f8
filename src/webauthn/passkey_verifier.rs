//! # Passkey Verifier
//!
//! [`CredentialVerifier`] backed by `webauthn-rs`. The library mints the
//! challenge and checks client data, authenticator data, the attestation and
//! the assertion signature; this adapter serializes its ceremony state for
//! the challenge store and adds the checks the ceremonies rely on:
//!
//! - `id`, `rawId` and the attested credential id name the same credential
//! - the assertion's `userHandle` is the account that owns the credential
//! - the signature counter advances against the stored counter

use crate::config::RelyingParty;
use crate::db::models::{Account, DeviceType};
use crate::webauthn::types::decode_base64url;
use crate::webauthn::verifier::{
    counter_advances, CredentialVerifier, PendingCeremony, StoredAuthenticator,
    VerifiedAuthentication, VerifiedRegistration, VerifyError,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CredentialID, DiscoverableAuthentication, DiscoverableKey, Passkey, PasskeyRegistration,
    Url, Webauthn, WebauthnBuilder, WebauthnError,
};
use webauthn_rs_proto::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse, ResidentKeyRequirement,
};

pub struct PasskeyVerifier {
    webauthn: Webauthn,
}

impl PasskeyVerifier {
    pub fn new(relying_party: &RelyingParty) -> Result<Self> {
        let origin = Url::parse(&relying_party.origin)?;
        let webauthn = WebauthnBuilder::new(&relying_party.id, &origin)
            .map_err(|e| anyhow!("Invalid WebAuthn relying party: {:?}", e))?
            .rp_name(&relying_party.name)
            .allow_subdomains(false)
            .build()
            .map_err(|e| anyhow!("WebAuthn build error: {:?}", e))?;

        Ok(PasskeyVerifier { webauthn })
    }
}

/// The parts of a serialized `Passkey` the credential repository indexes
#[derive(Deserialize)]
struct SerializedPasskey {
    cred: CredentialFlags,
}

#[derive(Deserialize)]
struct CredentialFlags {
    #[serde(default)]
    counter: u32,
    #[serde(default)]
    backup_eligible: bool,
    #[serde(default)]
    backup_state: bool,
}

fn internal(context: &str) -> impl FnOnce(serde_json::Error) -> VerifyError + '_ {
    move |e| VerifyError::Internal(format!("{}: {}", context, e))
}

fn rejected(e: WebauthnError) -> VerifyError {
    VerifyError::Rejected(e.to_string())
}

/// `rawId` is authoritative; `id` must be its base64url encoding
fn check_credential_id(id: &str, raw_id: &[u8]) -> Result<(), VerifyError> {
    match decode_base64url(id) {
        Ok(decoded) if decoded == raw_id => Ok(()),
        _ => Err(VerifyError::rejected("id does not match rawId")),
    }
}

#[async_trait]
impl CredentialVerifier for PasskeyVerifier {
    async fn start_registration(
        &self,
        account: &Account,
        exclude: Vec<Vec<u8>>,
    ) -> Result<(CreationChallengeResponse, PendingCeremony), VerifyError> {
        let user_id = Uuid::parse_str(&account.id)
            .map_err(|e| VerifyError::Internal(format!("Account id is not a UUID: {}", e)))?;
        let exclude: Vec<CredentialID> = exclude.into_iter().map(CredentialID::from).collect();

        let (mut options, registration) = self
            .webauthn
            .start_passkey_registration(
                user_id,
                &account.username,
                &account.display_name,
                (!exclude.is_empty()).then_some(exclude),
            )
            .map_err(|e| VerifyError::Internal(format!("start registration failed: {:?}", e)))?;

        // Authentication sends no allow-list, so only discoverable credentials can sign in
        if let Some(selection) = options.public_key.authenticator_selection.as_mut() {
            selection.require_resident_key = true;
            selection.resident_key = Some(ResidentKeyRequirement::Required);
        }

        let challenge: &[u8] = options.public_key.challenge.as_ref();
        let pending = PendingCeremony {
            challenge: challenge.to_vec(),
            state: serde_json::to_string(&registration)
                .map_err(internal("Serialize registration state failed"))?,
        };

        Ok((options, pending))
    }

    async fn verify_registration(
        &self,
        state: &str,
        response: &RegisterPublicKeyCredential,
    ) -> Result<VerifiedRegistration, VerifyError> {
        let registration: PasskeyRegistration =
            serde_json::from_str(state).map_err(internal("Corrupt registration state"))?;

        let raw_id: &[u8] = response.raw_id.as_ref();
        check_credential_id(&response.id, raw_id)?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &registration)
            .map_err(rejected)?;

        let attested: &[u8] = passkey.cred_id().as_ref();
        if attested != raw_id {
            return Err(VerifyError::rejected(
                "rawId does not match the attested credential id",
            ));
        }

        let serialized =
            serde_json::to_string(&passkey).map_err(internal("Serialize passkey failed"))?;
        let flags: SerializedPasskey =
            serde_json::from_str(&serialized).map_err(internal("Unexpected passkey layout"))?;

        let transports = response
            .response
            .transports
            .iter()
            .flatten()
            .filter_map(|transport| serde_json::to_value(transport).ok())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();

        Ok(VerifiedRegistration {
            credential_id: attested.to_vec(),
            passkey: serialized,
            sign_count: flags.cred.counter,
            device_type: if flags.cred.backup_eligible {
                DeviceType::MultiDevice
            } else {
                DeviceType::SingleDevice
            },
            backed_up: flags.cred.backup_state,
            transports,
        })
    }

    async fn start_authentication(
        &self,
    ) -> Result<(RequestChallengeResponse, PendingCeremony), VerifyError> {
        let (options, authentication) = self
            .webauthn
            .start_discoverable_authentication()
            .map_err(|e| VerifyError::Internal(format!("start authentication failed: {:?}", e)))?;

        let challenge: &[u8] = options.public_key.challenge.as_ref();
        let pending = PendingCeremony {
            challenge: challenge.to_vec(),
            state: serde_json::to_string(&authentication)
                .map_err(internal("Serialize authentication state failed"))?,
        };

        Ok((options, pending))
    }

    async fn verify_authentication(
        &self,
        state: &str,
        stored: &StoredAuthenticator,
        response: &PublicKeyCredential,
    ) -> Result<VerifiedAuthentication, VerifyError> {
        let authentication: DiscoverableAuthentication =
            serde_json::from_str(state).map_err(internal("Corrupt authentication state"))?;
        let passkey: Passkey =
            serde_json::from_str(&stored.passkey).map_err(internal("Corrupt stored passkey"))?;

        check_credential_id(&response.id, response.raw_id.as_ref())?;

        let (user_handle, _) = self
            .webauthn
            .identify_discoverable_authentication(response)
            .map_err(rejected)?;
        if user_handle != stored.user_handle {
            return Err(VerifyError::rejected(
                "userHandle does not belong to the credential's account",
            ));
        }

        let result = match self.webauthn.finish_discoverable_authentication(
            response,
            authentication,
            &[DiscoverableKey::from(&passkey)],
        ) {
            Ok(result) => result,
            Err(WebauthnError::CredentialPossibleCompromise) => {
                return Err(VerifyError::CounterRegression {
                    stored: stored.sign_count,
                })
            }
            Err(e) => return Err(rejected(e)),
        };

        // The serialized passkey keeps its registration-time counter
        if !counter_advances(stored.sign_count, result.counter()) {
            return Err(VerifyError::CounterRegression {
                stored: stored.sign_count,
            });
        }

        Ok(VerifiedAuthentication {
            sign_count: result.counter(),
        })
    }
}
