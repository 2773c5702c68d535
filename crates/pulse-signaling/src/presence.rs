//! Online-user broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use pulse_core::events::ServerEvent;
use pulse_core::ids::Identity;
use tracing::{debug, warn};

use crate::connection::ClientConnection;

/// Broadcasts the full online set to every bound connection.
///
/// Every membership change goes to everyone, not just the peer that
/// changed, so each client's online list is always the complete set.
#[derive(Debug, Default)]
pub struct PresencePublisher;

impl PresencePublisher {
    /// Create a publisher.
    pub fn new() -> Self {
        Self
    }

    /// Sorted identities of `connections`.
    pub fn snapshot(connections: &HashMap<Identity, Arc<ClientConnection>>) -> Vec<Identity> {
        let mut online: Vec<Identity> = connections.keys().cloned().collect();
        online.sort_unstable();
        online
    }

    /// Send the current online set to every connection.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn announce(&self, connections: &HashMap<Identity, Arc<ClientConnection>>) -> usize {
        let Some(frame) = Self::frame(connections) else {
            return 0;
        };
        let delivered = connections
            .values()
            .filter(|conn| {
                let sent = conn.send(Arc::clone(&frame));
                if !sent {
                    warn!(conn_id = %conn.id, identity = %conn.identity(), "failed to queue presence update");
                }
                sent
            })
            .count();
        counter!("presence_broadcasts_total").increment(1);
        debug!(online = connections.len(), delivered, "presence announced");
        delivered
    }

    /// Send the current online set to a single connection.
    pub fn send_snapshot(
        &self,
        to: &ClientConnection,
        connections: &HashMap<Identity, Arc<ClientConnection>>,
    ) -> bool {
        Self::frame(connections).is_some_and(|frame| to.send(frame))
    }

    fn frame(connections: &HashMap<Identity, Arc<ClientConnection>>) -> Option<Arc<String>> {
        let event = ServerEvent::OnlineUsers(Self::snapshot(connections));
        match event.to_frame() {
            Ok(frame) => Some(Arc::new(frame)),
            Err(e) => {
                warn!(error = %e, "failed to serialize presence");
                None
            }
        }
    }
}
