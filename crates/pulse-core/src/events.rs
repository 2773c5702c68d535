//! Wire vocabulary between clients and the coordinator.
//!
//! Every frame is a JSON text frame shaped as `{"event": <name>, "data": <payload>}`.
//! Inbound frames decode into [`ClientEvent`]; outbound frames are produced
//! from [`ServerEvent`].
//!
//! `webrtc-signal` and `newMessage` payloads are opaque: they are kept as the
//! original JSON object so they can be forwarded key-for-key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::ids::Identity;

/// `call-request` event name.
pub const CALL_REQUEST: &str = "call-request";
/// `call-accepted` event name.
pub const CALL_ACCEPTED: &str = "call-accepted";
/// `call-rejected` event name.
pub const CALL_REJECTED: &str = "call-rejected";
/// `call-ended` event name.
pub const CALL_ENDED: &str = "call-ended";
/// `call-error` event name (outbound only).
pub const CALL_ERROR: &str = "call-error";
/// `webrtc-signal` event name.
pub const WEBRTC_SIGNAL: &str = "webrtc-signal";
/// `newMessage` event name.
pub const NEW_MESSAGE: &str = "newMessage";
/// `getOnlineUsers` event name (outbound only).
pub const ONLINE_USERS: &str = "getOnlineUsers";

/// Field naming the peer a call or signal event is addressed to.
pub const TARGET_FIELD: &str = "targetUserId";
/// Field naming the recipient of a chat message.
pub const RECEIVER_FIELD: &str = "receiverId";
/// Field stamped onto relayed signals with the sender's identity.
pub const FROM_FIELD: &str = "fromUserId";

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Negotiation message kind carried by `webrtc-signal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// Trickled ICE candidate.
    IceCandidate,
}

impl SignalType {
    /// Parse the wire value of the `type` field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice-candidate" => Some(Self::IceCandidate),
            _ => None,
        }
    }

    /// Wire value of the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

/// A `webrtc-signal` payload with its routing fields extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalMessage {
    /// Negotiation message kind.
    pub signal_type: SignalType,
    /// Addressee.
    pub target: Identity,
    /// The complete payload as received, `type` and `targetUserId` included.
    pub payload: Map<String, Value>,
}

/// A persisted chat message to push to its recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    /// Recipient identity (`receiverId`).
    pub receiver: Identity,
    /// The complete message object as stored by the message store.
    pub payload: Map<String, Value>,
}

impl ChatMessage {
    /// Build from a JSON value, requiring an object with a non-blank `receiverId`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let payload = into_object(NEW_MESSAGE, value)?;
        let receiver = required_identity(NEW_MESSAGE, &payload, RECEIVER_FIELD)?;
        Ok(Self { receiver, payload })
    }
}

/// An event received from a client connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// Ask `target` to join a call.
    CallRequest {
        /// Callee.
        target: Identity,
    },
    /// Callee accepts a call from `target` (the original caller).
    CallAccepted {
        /// Original caller.
        target: Identity,
    },
    /// Callee declines a call from `target` (the original caller).
    CallRejected {
        /// Original caller.
        target: Identity,
    },
    /// Either party hangs up.
    CallEnded {
        /// The other party.
        target: Identity,
    },
    /// Offer/answer/candidate exchange.
    WebrtcSignal(SignalMessage),
    /// A chat message to fan out to its recipient.
    NewMessage(ChatMessage),
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnEnvelope);
        }
        let RawEnvelope { event, data } =
            serde_json::from_value(value).map_err(|_| ProtocolError::NotAnEnvelope)?;

        match event.as_str() {
            CALL_REQUEST => Ok(Self::CallRequest {
                target: target_of(CALL_REQUEST, data)?,
            }),
            CALL_ACCEPTED => Ok(Self::CallAccepted {
                target: target_of(CALL_ACCEPTED, data)?,
            }),
            CALL_REJECTED => Ok(Self::CallRejected {
                target: target_of(CALL_REJECTED, data)?,
            }),
            CALL_ENDED => Ok(Self::CallEnded {
                target: target_of(CALL_ENDED, data)?,
            }),
            WEBRTC_SIGNAL => {
                let payload = into_object(WEBRTC_SIGNAL, data)?;
                let raw_type = payload
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingField {
                        event: WEBRTC_SIGNAL,
                        field: "type",
                    })?;
                let signal_type = SignalType::parse(raw_type)
                    .ok_or_else(|| ProtocolError::InvalidSignalType(raw_type.to_owned()))?;
                let target = required_identity(WEBRTC_SIGNAL, &payload, TARGET_FIELD)?;
                Ok(Self::WebrtcSignal(SignalMessage {
                    signal_type,
                    target,
                    payload,
                }))
            }
            NEW_MESSAGE => Ok(Self::NewMessage(ChatMessage::from_value(data)?)),
            _ => Err(ProtocolError::UnknownEvent(event)),
        }
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallRequest { .. } => CALL_REQUEST,
            Self::CallAccepted { .. } => CALL_ACCEPTED,
            Self::CallRejected { .. } => CALL_REJECTED,
            Self::CallEnded { .. } => CALL_ENDED,
            Self::WebrtcSignal(_) => WEBRTC_SIGNAL,
            Self::NewMessage(_) => NEW_MESSAGE,
        }
    }

    /// The identity this event is addressed to.
    pub fn target(&self) -> &Identity {
        match self {
            Self::CallRequest { target }
            | Self::CallAccepted { target }
            | Self::CallRejected { target }
            | Self::CallEnded { target } => target,
            Self::WebrtcSignal(signal) => &signal.target,
            Self::NewMessage(message) => &message.receiver,
        }
    }
}

fn into_object(event: &'static str, data: Value) -> Result<Map<String, Value>, ProtocolError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::PayloadNotObject { event }),
    }
}

fn required_identity(
    event: &'static str,
    payload: &Map<String, Value>,
    field: &'static str,
) -> Result<Identity, ProtocolError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(Identity::parse)
        .ok_or(ProtocolError::MissingField { event, field })
}

fn target_of(event: &'static str, data: Value) -> Result<Identity, ProtocolError> {
    let payload = into_object(event, data)?;
    required_identity(event, &payload, TARGET_FIELD)
}

/// Display identity of a caller, as shown on the callee's ringing screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerProfile {
    /// Caller identity.
    pub id: Identity,
    /// Human-readable name.
    pub display_name: String,
    /// Avatar reference (URL or storage key), if the caller has one.
    pub avatar_ref: Option<String>,
}

/// An event pushed from the coordinator to a client connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full set of currently bound identities.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<Identity>),
    /// Incoming call. `target_user_id` is the caller, i.e. whom to answer.
    #[serde(rename = "call-request", rename_all = "camelCase")]
    CallRequest {
        /// Caller profile.
        from_user: CallerProfile,
        /// Identity the callee should address its reply to.
        target_user_id: Identity,
    },
    /// The callee accepted.
    #[serde(rename = "call-accepted", rename_all = "camelCase")]
    CallAccepted {
        /// The callee, i.e. whom the caller negotiates with.
        target_user_id: Identity,
        /// The callee.
        accepted_by: Identity,
    },
    /// The callee declined.
    #[serde(rename = "call-rejected")]
    CallRejected {},
    /// The other party hung up.
    #[serde(rename = "call-ended")]
    CallEnded {},
    /// A call or signal event from this client could not be completed.
    #[serde(rename = "call-error")]
    CallError {
        /// Human-readable reason.
        message: String,
    },
    /// Relayed negotiation payload, stamped with `fromUserId`.
    #[serde(rename = "webrtc-signal")]
    WebrtcSignal(Map<String, Value>),
    /// Pushed chat message.
    #[serde(rename = "newMessage")]
    NewMessage(Map<String, Value>),
}

impl ServerEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => ONLINE_USERS,
            Self::CallRequest { .. } => CALL_REQUEST,
            Self::CallAccepted { .. } => CALL_ACCEPTED,
            Self::CallRejected {} => CALL_REJECTED,
            Self::CallEnded {} => CALL_ENDED,
            Self::CallError { .. } => CALL_ERROR,
            Self::WebrtcSignal(_) => WEBRTC_SIGNAL,
            Self::NewMessage(_) => NEW_MESSAGE,
        }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
