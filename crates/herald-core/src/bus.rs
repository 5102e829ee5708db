//! In-process message bus carrying outbound notification envelopes as JSON.

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::types::Message;

/// Fan-out of JSON-encoded [`Message`] envelopes to every subscriber.
///
/// Cloning the bus clones the sending half; all clones feed the same subscribers.
#[derive(Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<String>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Encode and publish `msg`. Returns the number of subscribers that received it.
    ///
    /// Publishing without subscribers is not an error; the message is dropped.
    pub fn publish(&self, msg: &Message) -> Result<usize> {
        let payload = serde_json::to_string(msg)?;
        self.publish_raw(payload)
    }

    /// Publish an already-encoded envelope.
    pub fn publish_raw(&self, payload: String) -> Result<usize> {
        match self.tx.send(payload) {
            Ok(n) => Ok(n),
            Err(_) => {
                debug!("message bus has no subscribers, envelope dropped");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_encoded_envelope() {
        let bus = MessageBus::new(8);
        let mut rx = bus.subscribe();

        let n = bus
            .publish(&Message::new(42, "success.html", serde_json::json!("ok")))
            .unwrap();
        assert_eq!(n, 1);

        let raw = rx.recv().await.unwrap();
        let msg: Message = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.chat_id, Some(42));
        assert_eq!(msg.view, "success.html");
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = MessageBus::new(8);
        let n = bus
            .publish(&Message::new(1, "info.html", serde_json::json!("x")))
            .unwrap();
        assert_eq!(n, 0);
    }
}
