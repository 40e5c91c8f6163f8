//! # Passkey Authentication
//!
//! Discoverable-credential sign in: the server doesn't know who is signing
//! in until the assertion names a credential, so the challenge is bound to a
//! transient ceremony session id and no allow-list is sent.

use crate::db::accounts;
use crate::db::format_timestamp;
use crate::db::models::{ChallengeNamespace, PasskeyCredential};
use crate::error::{AppError, AppResult};
use crate::events::{publish, CeremonyEvent};
use crate::state::AppState;
use crate::webauthn::timeout_millis;
use crate::webauthn::types::{
    AuthenticatedAccount, Base64Url, CredentialView, PublicKeyCredential, RequestChallengeResponse,
};
use crate::webauthn::verifier::StoredAuthenticator;
use chrono::Utc;
use uuid::Uuid;

#[tracing::instrument(skip_all, fields(session_id = %session_id))]
pub async fn start_authentication(
    state: &AppState,
    session_id: &str,
) -> AppResult<RequestChallengeResponse> {
    let (mut options, pending) = state.verifier.start_authentication().await?;
    options.public_key.timeout = Some(timeout_millis(state.ttls.authentication));

    state
        .challenges
        .put(
            ChallengeNamespace::Authentication,
            session_id,
            &pending.challenge,
            &pending.state,
            state.ttls.authentication,
        )
        .await?;

    Ok(options)
}

/// Verify an assertion and resolve the account that owns the credential
///
/// This is where sign-in succeeds: the caller attaches the returned account
/// to the session.
///
/// ## Errors
/// - `MissingChallenge`: no live challenge for the session (expired, replayed, forged id)
/// - `UnknownCredential`: the assertion names a credential that isn't registered
/// - `VerificationFailed`: bad signature, origin, RP ID, challenge or user handle
/// - `PossibleCloneDetected`: the signature counter didn't advance
#[tracing::instrument(skip_all, fields(session_id = %session_id, credential_id = %response.id))]
pub async fn finish_authentication(
    state: &AppState,
    session_id: &str,
    response: &PublicKeyCredential,
) -> AppResult<AuthenticatedAccount> {
    let entry = state
        .challenges
        .get(ChallengeNamespace::Authentication, session_id)
        .await?
        .ok_or(AppError::MissingChallenge)?;

    let raw_id: &[u8] = response.raw_id.as_ref();
    let credential = state
        .credentials
        .find_by_id(raw_id)
        .await?
        .ok_or(AppError::UnknownCredential)?;

    let stored = StoredAuthenticator {
        passkey: credential.passkey.clone(),
        sign_count: credential.signature_counter()?,
        user_handle: Uuid::parse_str(&credential.account_id)
            .map_err(|e| AppError::Internal(format!("Credential owner is not a UUID: {}", e)))?,
    };

    let verified = match state
        .verifier
        .verify_authentication(&entry.state, &stored, response)
        .await
    {
        Ok(verified) => verified,
        Err(err) => {
            let err = AppError::from(err);
            if matches!(err, AppError::PossibleCloneDetected) {
                report_possible_clone(state, &credential, stored.sign_count);
            }
            return Err(err);
        }
    };

    if !state
        .challenges
        .consume(ChallengeNamespace::Authentication, session_id, &entry.challenge)
        .await?
    {
        return Err(AppError::MissingChallenge);
    }

    // Another request may have committed a higher counter since we read it
    let now = Utc::now();
    if let Err(err) = state
        .credentials
        .update_counter_and_last_used(&credential.id, verified.sign_count, now)
        .await
    {
        if matches!(err, AppError::PossibleCloneDetected) {
            report_possible_clone(state, &credential, stored.sign_count);
        }
        return Err(err);
    }

    let account = accounts::find_by_id(&state.db, &credential.account_id).await?;

    let updated = PasskeyCredential {
        sign_count: i64::from(verified.sign_count),
        last_used_at: Some(format_timestamp(now)),
        ..credential
    };
    let view = CredentialView::from(&updated);

    tracing::info!(
        account_id = %account.id,
        sign_count = verified.sign_count,
        "Passkey authentication succeeded"
    );
    publish(
        &state.events,
        CeremonyEvent::Authenticated {
            account_id: account.id.clone(),
            credential_id: view.id.clone(),
            sign_count: verified.sign_count,
        },
    );

    Ok(AuthenticatedAccount {
        account,
        credential: view,
    })
}

fn report_possible_clone(state: &AppState, credential: &PasskeyCredential, stored_sign_count: u32) {
    tracing::warn!(
        target: "security",
        account_id = %credential.account_id,
        stored_sign_count,
        "Signature counter regression"
    );
    publish(
        &state.events,
        CeremonyEvent::PossibleCloneDetected {
            account_id: credential.account_id.clone(),
            credential_id: Base64Url(credential.id.clone()),
            stored_sign_count,
        },
    );
}
