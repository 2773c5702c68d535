//! Protocol-level error types.

use thiserror::Error;

/// A frame that could not be decoded into a [`crate::events::ClientEvent`].
///
/// These are never reported back to the client: the frame is dropped, the
/// failure is logged, and the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame was JSON but not an `{event, data}` envelope.
    #[error("frame is not an event envelope")]
    NotAnEnvelope,
    /// The event name is not part of the inbound vocabulary.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    /// The event payload is not a JSON object.
    #[error("payload of `{event}` must be an object")]
    PayloadNotObject {
        /// Event name.
        event: &'static str,
    },
    /// A required field is absent, not a string, or blank.
    #[error("`{event}` is missing required field `{field}`")]
    MissingField {
        /// Event name.
        event: &'static str,
        /// Field name as it appears on the wire.
        field: &'static str,
    },
    /// `webrtc-signal.type` is not `offer`, `answer` or `ice-candidate`.
    #[error("unsupported signal type `{0}`")]
    InvalidSignalType(String),
}

impl ProtocolError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnEnvelope => "not_envelope",
            Self::UnknownEvent(_) => "unknown_event",
            Self::PayloadNotObject { .. } => "payload_not_object",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidSignalType(_) => "invalid_signal_type",
        }
    }
}
