//! Errors raised while handling a single client event.
//!
//! None of these are fatal to the process. Each is scoped to the offending
//! event (or, for [`SignalingError::IdentityMissing`], the offending
//! connection).

use pulse_core::errors::ProtocolError;
use pulse_core::ids::Identity;
use thiserror::Error;

use crate::profile::ProfileError;

/// `call-error` text for [`SignalingError::TargetOffline`].
pub const MSG_TARGET_OFFLINE: &str = "User is offline";
/// `call-error` text for [`SignalingError::ProfileLookupFailed`].
pub const MSG_PROFILE_LOOKUP_FAILED: &str = "Unable to start call";
/// `call-error` text for [`SignalingError::OutOfOrder`].
pub const MSG_OUT_OF_ORDER: &str = "No matching call";
/// `call-error` text for [`SignalingError::CallInProgress`].
pub const MSG_CALL_IN_PROGRESS: &str = "Call already in progress";

/// Failure handling one client event.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The addressed identity has no bound connection.
    #[error("target {0} is offline")]
    TargetOffline(Identity),
    /// A connection was opened without an identity.
    #[error("connection opened without an identity")]
    IdentityMissing,
    /// The caller's display profile could not be resolved.
    #[error("profile lookup for {identity} failed: {source}")]
    ProfileLookupFailed {
        /// Caller whose profile was requested.
        identity: Identity,
        /// Underlying failure.
        #[source]
        source: ProfileError,
    },
    /// The frame could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] ProtocolError),
    /// A call event arrived with no matching call record (strict mode).
    #[error("`{event}` has no matching call with {peer}")]
    OutOfOrder {
        /// Event name.
        event: &'static str,
        /// The other party named by the event.
        peer: Identity,
    },
    /// A call between the pair is already live (strict mode).
    #[error("call with {0} already in progress")]
    CallInProgress(Identity),
    /// A new identity tried to bind while the registry was full.
    #[error("connection limit of {0} reached")]
    AtCapacity(usize),
}

impl SignalingError {
    /// Text for the `call-error` sent back to the sender, or `None` when the
    /// error is only logged.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            Self::TargetOffline(_) => Some(MSG_TARGET_OFFLINE),
            Self::ProfileLookupFailed { .. } => Some(MSG_PROFILE_LOOKUP_FAILED),
            Self::OutOfOrder { .. } => Some(MSG_OUT_OF_ORDER),
            Self::CallInProgress(_) => Some(MSG_CALL_IN_PROGRESS),
            Self::IdentityMissing | Self::MalformedEvent(_) | Self::AtCapacity(_) => None,
        }
    }

    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TargetOffline(_) => "target_offline",
            Self::IdentityMissing => "identity_missing",
            Self::ProfileLookupFailed { .. } => "profile_lookup_failed",
            Self::MalformedEvent(_) => "malformed_event",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::CallInProgress(_) => "call_in_progress",
            Self::AtCapacity(_) => "at_capacity",
        }
    }
}
