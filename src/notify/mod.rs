//! Push channel to dashboard subscribers.
//!
//! Events are JSON objects `{"type": ..., "data": ...}` serialized once and
//! fanned out as the same text to every subscriber.

pub mod relay;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub use relay::relay_router;

pub const EVENT_HEIGHT: &str = "height";
pub const EVENT_SKELETAL: &str = "skeletal";
pub const EVENT_SESSION_STATE: &str = "session_state";
pub const EVENT_DEVICE_STATUS: &str = "device_status";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<String>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, data: &T) {
        let event = match serde_json::to_value(data) {
            Ok(data) => PushEvent {
                kind: kind.to_string(),
                data,
            },
            Err(err) => {
                log::error!("Failed to serialize {kind} event: {err}");
                return;
            }
        };
        match serde_json::to_string(&event) {
            Ok(text) => self.publish_raw(text),
            Err(err) => log::error!("Failed to encode {kind} event: {err}"),
        }
    }

    /// Sends already-encoded text. Having no subscribers is not an error.
    pub fn publish_raw(&self, text: String) {
        let _ = self.tx.send(text);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn every_subscriber_gets_the_same_text() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.publish(EVENT_HEIGHT, &json!({ "patientId": "P1", "height": 1.7 }));

        let first = a.recv().await.unwrap();
        assert_eq!(first, b.recv().await.unwrap());
        let event: PushEvent = serde_json::from_str(&first).unwrap();
        assert_eq!(event.kind, "height");
        assert_eq!(event.data["height"], 1.7);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        Notifier::new().publish(EVENT_SESSION_STATE, &json!({ "mode": "idle" }));
    }
}
