//! Identity → connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pulse_core::ids::Identity;
use tracing::{debug, info};

use crate::connection::ClientConnection;
use crate::error::SignalingError;
use crate::presence::PresencePublisher;

/// Result of a successful [`ConnectionRegistry::bind`].
#[derive(Debug)]
pub enum BindOutcome {
    /// The identity was not bound before; presence was announced to everyone.
    Added,
    /// The identity was already bound. The previous connection is returned
    /// and is not notified; only the new connection receives the online set.
    Replaced(Arc<ClientConnection>),
}

/// Maps each online identity to exactly one live connection.
///
/// Binding an identity that is already bound replaces the old connection
/// (last write wins). Unbinding is by connection, so a late disconnect from
/// a replaced connection leaves the newer binding alone.
///
/// Membership changes are announced while the write lock is held, so
/// presence frames reach every connection in mutation order.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Identity, Arc<ClientConnection>>>,
    presence: PresencePublisher,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` under its identity.
    pub fn bind(&self, connection: Arc<ClientConnection>) -> Result<BindOutcome, SignalingError> {
        self.bind_within(connection, usize::MAX)
    }

    /// Bind `connection` unless that would take the registry past `limit`
    /// bound identities. Rebinding an identity that is already bound never
    /// counts against the limit. The check and the insert share one lock.
    pub fn bind_within(&self, connection: Arc<ClientConnection>, limit: usize) -> Result<BindOutcome, SignalingError> {
        let identity = connection.identity().clone();
        if identity.trim().is_empty() {
            return Err(SignalingError::IdentityMissing);
        }

        let mut conns = self.connections.write();
        if conns.len() >= limit && !conns.contains_key(&identity) {
            debug!(%identity, conn_id = %connection.id, limit, "bind refused, registry full");
            return Err(SignalingError::AtCapacity(limit));
        }
        match conns.insert(identity.clone(), Arc::clone(&connection)) {
            None => {
                let _ = self.presence.announce(&conns);
                info!(%identity, conn_id = %connection.id, online = conns.len(), "identity bound");
                Ok(BindOutcome::Added)
            }
            Some(previous) => {
                let _ = self.presence.send_snapshot(&connection, &conns);
                info!(
                    %identity,
                    conn_id = %connection.id,
                    replaced = %previous.id,
                    "identity rebound, previous connection evicted"
                );
                Ok(BindOutcome::Replaced(previous))
            }
        }
    }

    /// Remove the binding held by `connection`, if it still holds one.
    ///
    /// Returns `true` if a binding was removed (and presence announced).
    pub fn unbind(&self, connection: &ClientConnection) -> bool {
        let mut conns = self.connections.write();
        let is_current = conns
            .get(connection.identity())
            .is_some_and(|bound| bound.id == connection.id);
        if !is_current {
            debug!(identity = %connection.identity(), conn_id = %connection.id, "unbind of stale connection ignored");
            return false;
        }
        let _ = conns.remove(connection.identity());
        let _ = self.presence.announce(&conns);
        info!(identity = %connection.identity(), conn_id = %connection.id, online = conns.len(), "identity unbound");
        true
    }

    /// Connection currently bound to `identity`.
    pub fn resolve(&self, identity: &Identity) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(identity).cloned()
    }

    /// Sorted list of online identities.
    pub fn online(&self) -> Vec<Identity> {
        PresencePublisher::snapshot(&self.connections.read())
    }

    /// All bound connections.
    pub fn connections(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
