//! # Passkey Registration
//!
//! Binds a new authenticator to an account that is already signed in.
//! Registration never authenticates anyone by itself.
//!
//! ## Registration Flow
//! 1. **Start**: list the account's existing credentials as exclusions, let
//!    the verifier mint a challenge, store it with the ceremony state
//! 2. **Finish**: check the challenge is still live, let the verifier check
//!    the attestation against that state, consume the challenge, store the
//!    credential

use crate::db::models::{Account, ChallengeNamespace, NewCredential};
use crate::error::{AppError, AppResult};
use crate::events::{publish, CeremonyEvent};
use crate::state::AppState;
use crate::webauthn::timeout_millis;
use crate::webauthn::types::{CreationChallengeResponse, CredentialView, RegisterPublicKeyCredential};

const MAX_CREDENTIAL_NAME_LEN: usize = 64;

/// Issue creation options for `account`
///
/// Supersedes any registration the account had in flight.
#[tracing::instrument(skip_all, fields(account_id = %account.id))]
pub async fn start_registration(
    state: &AppState,
    account: &Account,
) -> AppResult<CreationChallengeResponse> {
    let existing = state.credentials.list_by_account(&account.id).await?;
    let exclude = existing.iter().map(|credential| credential.id.clone()).collect();

    let (mut options, pending) = state.verifier.start_registration(account, exclude).await?;
    options.public_key.timeout = Some(timeout_millis(state.ttls.registration));

    state
        .challenges
        .put(
            ChallengeNamespace::Registration,
            &account.id,
            &pending.challenge,
            &pending.state,
            state.ttls.registration,
        )
        .await?;

    tracing::debug!(excluded = existing.len(), "Registration options issued");

    Ok(options)
}

/// Verify the client's attestation and store the new credential
///
/// ## Errors
/// - `MissingChallenge`: no live challenge (expired, replayed, never issued)
/// - `VerificationFailed`: the verifier rejected the attestation; nothing is mutated
/// - `DuplicateCredential`: the credential id is already registered
#[tracing::instrument(skip_all, fields(account_id = %account.id))]
pub async fn finish_registration(
    state: &AppState,
    account: &Account,
    name: &str,
    response: &RegisterPublicKeyCredential,
) -> AppResult<CredentialView> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_CREDENTIAL_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Passkey name must be 1 to {} characters",
            MAX_CREDENTIAL_NAME_LEN
        )));
    }

    let entry = state
        .challenges
        .get(ChallengeNamespace::Registration, &account.id)
        .await?
        .ok_or(AppError::MissingChallenge)?;

    let verified = state
        .verifier
        .verify_registration(&entry.state, response)
        .await?;

    // Only one submission of this response can get past here
    if !state
        .challenges
        .consume(ChallengeNamespace::Registration, &account.id, &entry.challenge)
        .await?
    {
        return Err(AppError::MissingChallenge);
    }

    let credential = state
        .credentials
        .insert(NewCredential {
            id: verified.credential_id,
            account_id: account.id.clone(),
            name: name.to_string(),
            passkey: verified.passkey,
            sign_count: verified.sign_count,
            device_type: verified.device_type,
            backed_up: verified.backed_up,
            transports: verified.transports,
        })
        .await?;

    let view = CredentialView::from(&credential);
    tracing::info!(credential_id = %view.id, "Passkey registered");
    publish(
        &state.events,
        CeremonyEvent::CredentialRegistered {
            account_id: account.id.clone(),
            credential_id: view.id.clone(),
        },
    );

    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChallengeTtls;
    use crate::db::accounts;
    use crate::db::models::DeviceType;
    use crate::test_support::{test_state, test_state_with_ttls, SoftAuthenticator};
    use crate::webauthn::types::Base64Url;
    use base64::prelude::*;
    use std::time::Duration;

    async fn alice(state: &AppState) -> Account {
        accounts::create_account(&state.db, "alice", "Alice Smith")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn options_describe_account_and_relying_party() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        let value = serde_json::to_value(&options).unwrap();
        let public_key = &value["publicKey"];

        assert_eq!(public_key["rp"]["id"], "passkeys.example.com");
        assert_eq!(public_key["rp"]["name"], "Passkey Tests");
        assert_eq!(public_key["user"]["name"], "alice");
        assert_eq!(public_key["user"]["displayName"], "Alice Smith");
        assert_eq!(public_key["timeout"], 600_000);
        assert_eq!(public_key["authenticatorSelection"]["residentKey"], "required");
        let excluded = public_key["excludeCredentials"]
            .as_array()
            .map_or(0, Vec::len);
        assert_eq!(excluded, 0);

        let stored = state
            .challenges
            .get(ChallengeNamespace::Registration, &account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            public_key["challenge"],
            BASE64_URL_SAFE_NO_PAD.encode(&stored.challenge)
        );
        assert!(!stored.state.is_empty());
    }

    #[tokio::test]
    async fn registers_credential() {
        let state = test_state().await;
        let account = alice(&state).await;
        let mut events = state.events.subscribe();
        let authenticator = SoftAuthenticator::new(b"cred-1");

        let options = start_registration(&state, &account).await.unwrap();
        let view = finish_registration(
            &state,
            &account,
            "  MacBook  ",
            &authenticator.register(&options, 0),
        )
        .await
        .unwrap();

        assert_eq!(view.id.as_slice(), b"cred-1");
        assert_eq!(view.name, "MacBook");
        assert_eq!(view.sign_count, 0);
        assert_eq!(view.device_type, DeviceType::MultiDevice);
        assert!(view.backed_up);
        assert_eq!(view.transports, vec!["internal", "hybrid"]);

        let stored = state.credentials.list_by_account(&account.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].passkey.is_empty());

        assert_eq!(
            events.try_recv().unwrap(),
            CeremonyEvent::CredentialRegistered {
                account_id: account.id.clone(),
                credential_id: Base64Url(b"cred-1".to_vec()),
            }
        );
    }

    #[tokio::test]
    async fn existing_credentials_are_excluded() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        finish_registration(
            &state,
            &account,
            "Phone",
            &SoftAuthenticator::new(b"cred-1").register(&options, 0),
        )
        .await
        .unwrap();

        let options = start_registration(&state, &account).await.unwrap();
        let value = serde_json::to_value(&options).unwrap();
        let excluded = value["publicKey"]["excludeCredentials"].as_array().unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0]["id"], BASE64_URL_SAFE_NO_PAD.encode(b"cred-1"));
    }

    #[tokio::test]
    async fn credential_id_is_unique_across_accounts() {
        let state = test_state().await;
        let account = alice(&state).await;
        let bob = accounts::create_account(&state.db, "bob", "Bob")
            .await
            .unwrap();

        let options = start_registration(&state, &account).await.unwrap();
        finish_registration(
            &state,
            &account,
            "Phone",
            &SoftAuthenticator::new(b"cred-1").register(&options, 0),
        )
        .await
        .unwrap();

        let options = start_registration(&state, &bob).await.unwrap();
        let err = finish_registration(
            &state,
            &bob,
            "Phone",
            &SoftAuthenticator::new(b"cred-1").register(&options, 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DuplicateCredential));
        assert!(state.credentials.list_by_account(&bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_challenge_is_missing_not_unverified() {
        let state = test_state_with_ttls(ChallengeTtls {
            registration: Duration::ZERO,
            authentication: Duration::from_secs(300),
        })
        .await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        // Even a response that would fail verification reports the missing challenge
        let response = SoftAuthenticator::new(b"cred-1")
            .at_origin("https://evil.example")
            .register(&options, 0);

        let err = finish_registration(&state, &account, "Key", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingChallenge));
    }

    #[tokio::test]
    async fn replayed_response_is_rejected() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        let response = SoftAuthenticator::new(b"cred-1").register(&options, 0);

        finish_registration(&state, &account, "Key", &response)
            .await
            .unwrap();
        let err = finish_registration(&state, &account, "Key", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingChallenge));
    }

    #[tokio::test]
    async fn failed_verification_mutates_nothing() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        let forged = SoftAuthenticator::new(b"cred-1")
            .at_origin("https://evil.example")
            .register(&options, 0);

        let err = finish_registration(&state, &account, "Key", &forged)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
        assert!(state
            .credentials
            .list_by_account(&account.id)
            .await
            .unwrap()
            .is_empty());

        // The challenge is still usable by the genuine authenticator
        let genuine = SoftAuthenticator::new(b"cred-2").register(&options, 0);
        finish_registration(&state, &account, "Key", &genuine)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bare_authenticator_data_registers_nothing() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        let response = SoftAuthenticator::new(b"chosen-by-client")
            .omit_attested_credential()
            .register(&options, 0);

        let err = finish_registration(&state, &account, "Key", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
        assert!(state
            .credentials
            .find_by_id(b"chosen-by-client")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn raw_id_other_than_the_attested_one_registers_nothing() {
        let state = test_state().await;
        let account = alice(&state).await;

        let options = start_registration(&state, &account).await.unwrap();
        let response = SoftAuthenticator::new(b"cred-1")
            .reporting_raw_id(b"cred-victim")
            .register(&options, 0);

        let err = finish_registration(&state, &account, "Key", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
        assert!(state
            .credentials
            .list_by_account(&account.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn challenge_is_bound_to_the_account() {
        let state = test_state().await;
        let account = alice(&state).await;
        let mallory = accounts::create_account(&state.db, "mallory", "Mallory")
            .await
            .unwrap();

        let options = start_registration(&state, &account).await.unwrap();
        let response = SoftAuthenticator::new(b"cred-1").register(&options, 0);

        let err = finish_registration(&state, &mallory, "Key", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingChallenge));
    }

    #[tokio::test]
    async fn restarting_supersedes_the_old_challenge() {
        let state = test_state().await;
        let account = alice(&state).await;

        let first = start_registration(&state, &account).await.unwrap();
        let _second = start_registration(&state, &account).await.unwrap();

        let stale = SoftAuthenticator::new(b"cred-1").register(&first, 0);
        let err = finish_registration(&state, &account, "Key", &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn credential_name_is_required() {
        let state = test_state().await;
        let account = alice(&state).await;
        let options = start_registration(&state, &account).await.unwrap();
        let response = SoftAuthenticator::new(b"cred-1").register(&options, 0);

        let err = finish_registration(&state, &account, "   ", &response)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
