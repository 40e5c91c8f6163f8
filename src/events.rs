//! # Ceremony Events
//!
//! Outcomes the rest of the system (account security, session management)
//! cares about, published on a `tokio::sync::broadcast` channel. Publishing
//! never blocks a ceremony and works with no subscribers.

use crate::webauthn::types::Base64Url;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CeremonyEvent {
    CredentialRegistered {
        account_id: String,
        credential_id: Base64Url,
    },
    Authenticated {
        account_id: String,
        credential_id: Base64Url,
        sign_count: u32,
    },
    /// A counter regression: the authenticator may have been cloned
    PossibleCloneDetected {
        account_id: String,
        credential_id: Base64Url,
        stored_sign_count: u32,
    },
}

pub fn channel() -> broadcast::Sender<CeremonyEvent> {
    broadcast::channel(CHANNEL_CAPACITY).0
}

pub fn publish(events: &broadcast::Sender<CeremonyEvent>, event: CeremonyEvent) {
    // Err only means nobody is subscribed
    let _ = events.send(event);
}

/// Log every event until the channel closes
pub async fn log_events(mut events: broadcast::Receiver<CeremonyEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!(?event, "Ceremony event"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Ceremony event logger fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let events = channel();
        publish(
            &events,
            CeremonyEvent::CredentialRegistered {
                account_id: "acct".into(),
                credential_id: Base64Url(b"cred".to_vec()),
            },
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = CeremonyEvent::PossibleCloneDetected {
            account_id: "acct".into(),
            credential_id: Base64Url(b"cred-1".to_vec()),
            stored_sign_count: 5,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "event": "possible_clone_detected",
                "account_id": "acct",
                "credential_id": "Y3JlZC0x",
                "stored_sign_count": 5
            })
        );
    }
}
