//! Stateless forwarding of negotiation messages.

use std::sync::Arc;

use metrics::counter;
use pulse_core::events::{FROM_FIELD, ServerEvent, SignalMessage};
use pulse_core::ids::Identity;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SignalingError;
use crate::registry::ConnectionRegistry;

/// Forwards `webrtc-signal` payloads to the addressed peer.
///
/// The payload is passed through key-for-key; only `fromUserId` is added,
/// overwriting any value the sender supplied.
pub struct SignalRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalRelay {
    /// Relay over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forward `signal` from `sender` to its target.
    ///
    /// An unbound target is [`SignalingError::TargetOffline`].
    pub fn relay(&self, sender: &Identity, signal: SignalMessage) -> Result<(), SignalingError> {
        let Some(target) = self.registry.resolve(&signal.target) else {
            return Err(SignalingError::TargetOffline(signal.target));
        };
        let kind = signal.signal_type.as_str();
        let payload = stamp_sender(signal.payload, sender);
        let queued = target.send_event(&ServerEvent::WebrtcSignal(payload));
        counter!("signals_relayed_total", "type" => kind).increment(1);
        debug!(from = %sender, target = %signal.target, signal_type = kind, queued, "signal relayed");
        Ok(())
    }
}

/// Add `fromUserId: sender` to a payload.
pub fn stamp_sender(mut payload: Map<String, Value>, sender: &Identity) -> Map<String, Value> {
    let _ = payload.insert(FROM_FIELD.to_owned(), Value::String(sender.to_string()));
    payload
}
