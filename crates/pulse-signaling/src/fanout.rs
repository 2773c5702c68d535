//! Push delivery of persisted chat messages.

use std::sync::Arc;

use metrics::counter;
use pulse_core::events::{ChatMessage, ServerEvent};
use tracing::debug;

use crate::registry::ConnectionRegistry;

/// Forwards a stored chat message to its recipient if they are online.
///
/// Offline recipients are skipped silently; the message store stays the
/// durable record and the client fetches history on its next query.
pub struct MessageFanout {
    registry: Arc<ConnectionRegistry>,
}

impl MessageFanout {
    /// Fanout over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `message` to its receiver. Returns `true` if it was queued.
    pub fn deliver(&self, message: ChatMessage) -> bool {
        let Some(conn) = self.registry.resolve(&message.receiver) else {
            counter!("fanout_missed_total").increment(1);
            debug!(receiver = %message.receiver, "recipient offline, message not pushed");
            return false;
        };
        let queued = conn.send_event(&ServerEvent::NewMessage(message.payload));
        if queued {
            counter!("fanout_delivered_total").increment(1);
        }
        debug!(receiver = %message.receiver, queued, "message pushed");
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use pulse_core::ids::Identity;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn delivers_to_online_recipient() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _ = registry
            .bind(Arc::new(ClientConnection::new(Identity::from("bob"), tx)))
            .unwrap();
        let _ = rx.recv().await; // presence

        let fanout = MessageFanout::new(Arc::clone(&registry));
        let body = json!({"_id": "m1", "senderId": "alice", "receiverId": "bob", "text": "hi"});
        assert!(fanout.deliver(ChatMessage::from_value(body.clone()).unwrap()));

        let v: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(v, json!({"event": "newMessage", "data": body}));
    }

    #[test]
    fn offline_recipient_is_a_no_op() {
        let fanout = MessageFanout::new(Arc::new(ConnectionRegistry::new()));
        let msg = ChatMessage::from_value(json!({"receiverId": "ghost", "text": "hi"})).unwrap();
        assert!(!fanout.deliver(msg));
    }
}
