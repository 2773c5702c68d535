//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it changes.

mod logging;
mod profiles;
mod server;
mod signaling;

pub use logging::*;
pub use profiles::*;
pub use server::*;
pub use signaling::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Pulse gateway.
///
/// Loaded from `~/.pulse/settings.json` with defaults applied for missing
/// fields. Example:
///
/// ```json
/// {
///   "server": { "port": 5001 },
///   "signaling": { "strictTransitions": true, "ringTimeoutMs": 30000 },
///   "profiles": { "source": "http", "baseUrl": "http://localhost:5000/api" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Call coordination settings.
    pub signaling: SignalingSettings,
    /// Caller profile backend.
    pub profiles: ProfileSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl PulseSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be at least 1".into(),
            ));
        }
        if server.heartbeat_timeout_ms <= server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutMs must exceed server.heartbeatIntervalMs".into(),
            ));
        }
        if self.signaling.ring_timeout_enabled() && self.signaling.sweep_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "signaling.sweepIntervalMs must be at least 1 when ringTimeoutMs is set".into(),
            ));
        }
        if self.profiles.source == ProfileSource::Http && self.profiles.base_url.is_none() {
            return Err(SettingsError::InvalidValue(
                "profiles.baseUrl is required when profiles.source is \"http\"".into(),
            ));
        }
        Ok(())
    }
}
