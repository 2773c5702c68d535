//! Entry point for everything a client connection does.
//!
//! The transport calls [`SignalingHub::connect`] when a connection opens,
//! [`SignalingHub::handle_frame`] for each inbound text frame (in arrival
//! order), and [`SignalingHub::disconnect`] when it closes.

use std::sync::Arc;

use metrics::counter;
use pulse_core::events::{ChatMessage, ClientEvent, ServerEvent};
use pulse_core::ids::Identity;
use tracing::{debug, warn};

use crate::connection::ClientConnection;
use crate::coordinator::CallCoordinator;
use crate::error::SignalingError;
use crate::fanout::MessageFanout;
use crate::registry::{BindOutcome, ConnectionRegistry};
use crate::relay::SignalRelay;

/// Routes decoded client events to the registry, coordinator, relay and fanout.
pub struct SignalingHub {
    registry: Arc<ConnectionRegistry>,
    calls: Arc<CallCoordinator>,
    relay: SignalRelay,
    fanout: MessageFanout,
}

impl SignalingHub {
    /// Assemble a hub. `calls` must share `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, calls: Arc<CallCoordinator>) -> Self {
        Self {
            relay: SignalRelay::new(Arc::clone(&registry)),
            fanout: MessageFanout::new(Arc::clone(&registry)),
            registry,
            calls,
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The call coordinator.
    pub fn calls(&self) -> &Arc<CallCoordinator> {
        &self.calls
    }

    /// Register a newly opened connection.
    pub fn connect(&self, connection: Arc<ClientConnection>) -> Result<BindOutcome, SignalingError> {
        self.registry.bind(connection)
    }

    /// Register a newly opened connection, refusing a new identity once
    /// `limit` identities are bound.
    pub fn connect_within(&self, connection: Arc<ClientConnection>, limit: usize) -> Result<BindOutcome, SignalingError> {
        self.registry.bind_within(connection, limit)
    }

    /// Tear down a closed connection.
    ///
    /// Call state is only dropped if this connection still held the
    /// identity's binding. Returns whether it did.
    pub fn disconnect(&self, connection: &ClientConnection) -> bool {
        let removed = self.registry.unbind(connection);
        if removed {
            self.calls.on_disconnect(connection.identity());
        }
        removed
    }

    /// Decode and handle one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    pub async fn handle_frame(&self, sender: &Arc<ClientConnection>, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle_event(sender, event).await,
            Err(e) => {
                counter!("malformed_events_total", "kind" => e.kind()).increment(1);
                warn!(conn_id = %sender.id, identity = %sender.identity(), error = %e, "dropping malformed frame");
            }
        }
    }

    /// Handle one decoded event, reporting failures to the sending connection.
    pub async fn handle_event(&self, sender: &Arc<ClientConnection>, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch(sender.identity(), event).await {
            self.report(sender, name, &err);
        }
    }

    /// Handle one decoded event on behalf of `sender`.
    pub async fn dispatch(&self, sender: &Identity, event: ClientEvent) -> Result<(), SignalingError> {
        debug!(identity = %sender, event = event.name(), target = %event.target(), "client event");
        match event {
            ClientEvent::CallRequest { target } => self.calls.request(sender, target).await,
            ClientEvent::CallAccepted { target } => self.calls.accept(sender, target),
            ClientEvent::CallRejected { target } => self.calls.reject(sender, target),
            ClientEvent::CallEnded { target } => self.calls.end(sender, target),
            ClientEvent::WebrtcSignal(signal) => {
                let target = signal.target.clone();
                self.relay.relay(sender, signal)?;
                self.calls.observe_signal(sender, &target);
                Ok(())
            }
            ClientEvent::NewMessage(message) => {
                let _ = self.fanout.deliver(message);
                Ok(())
            }
        }
    }

    /// Push a persisted chat message to its recipient, if online.
    pub fn deliver_message(&self, message: ChatMessage) -> bool {
        self.fanout.deliver(message)
    }

    fn report(&self, sender: &ClientConnection, event: &'static str, err: &SignalingError) {
        counter!("call_errors_total", "kind" => err.kind()).increment(1);
        match err.client_message() {
            Some(message) => {
                debug!(identity = %sender.identity(), event, error = %err, "reporting call error");
                let _ = sender.send_event(&ServerEvent::CallError {
                    message: message.to_owned(),
                });
            }
            None => warn!(identity = %sender.identity(), event, error = %err, "event failed"),
        }
    }
}
