//! A live client connection as seen by the coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use pulse_core::events::ServerEvent;
use pulse_core::ids::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Represents a connected client bound to one identity.
///
/// Outbound frames go through a bounded channel to the transport's writer
/// task. Sends never wait: a full queue drops the frame and counts it, and
/// once the drop limit is reached the connection is marked for closing.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    identity: Identity,
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    max_drops: u64,
    close: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection with no drop limit.
    pub fn new(identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(ConnectionId::new(), identity, tx)
    }

    /// Create a connection with an explicit ID.
    pub fn with_id(id: ConnectionId, identity: Identity, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            max_drops: 0,
            close: CancellationToken::new(),
        }
    }

    /// Force-close the connection after `max_drops` dropped frames. `0` disables.
    #[must_use]
    pub fn with_drop_limit(mut self, max_drops: u64) -> Self {
        self.max_drops = max_drops;
        self
    }

    /// The identity this connection authenticated as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Queue a pre-serialized frame.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            return true;
        }
        let drops = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("send_queue_drops_total").increment(1);
        if self.max_drops > 0 && drops >= self.max_drops && !self.close.is_cancelled() {
            warn!(conn_id = %self.id, identity = %self.identity, drops, "send queue saturated, closing connection");
            self.close.cancel();
        }
        false
    }

    /// Serialize an event and queue it.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match event.to_frame() {
            Ok(frame) => self.send(Arc::new(frame)),
            Err(e) => {
                warn!(event = event.name(), error = %e, "failed to serialize event");
                false
            }
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Ask the transport to close this connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token cancelled when the connection should be closed.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientConnection::new(Identity::from("alice"), tx), rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(8);
        assert_eq!(conn.identity().as_str(), "alice");
        assert_eq!(conn.drop_count(), 0);
        assert!(!conn.is_closing());
    }

    #[tokio::test]
    async fn send_event_serializes() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send_event(&ServerEvent::CallEnded {}));
        let frame = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["event"], "call-ended");
    }

    #[tokio::test]
    async fn send_to_closed_channel_counts_drop() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert!(!conn.send(Arc::new("x".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("1".into())));
        assert!(!conn.send(Arc::new("2".into())));
        assert_eq!(conn.drop_count(), 1);
        assert!(!conn.is_closing());
    }

    #[test]
    fn drop_limit_requests_close() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(Identity::from("bob"), tx).with_drop_limit(3);
        assert!(conn.send(Arc::new("fill".into())));
        for _ in 0..2 {
            let _ = conn.send(Arc::new("x".into()));
        }
        assert!(!conn.is_closing());
        let _ = conn.send(Arc::new("x".into()));
        assert!(conn.is_closing());
        assert!(conn.close_token().is_cancelled());
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn explicit_close() {
        let (conn, _rx) = make_connection(8);
        let token = conn.close_token();
        conn.close();
        assert!(token.is_cancelled());
    }

    #[test]
    fn with_id_keeps_id() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::with_id(ConnectionId::from("c-1"), Identity::from("a"), tx);
        assert_eq!(conn.id.as_str(), "c-1");
    }
}
