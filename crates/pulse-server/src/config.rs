//! Server configuration.

use std::time::Duration;

use pulse_settings::{PulseSettings, SignalingSettings};
use pulse_signaling::CoordinatorConfig;

/// Runtime configuration for [`crate::PulseServer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently bound identities.
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which a client is disconnected.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Dropped frames after which a connection is closed (`0` disables).
    pub max_send_drops: u64,
    /// How often the ring-timeout sweeper runs.
    pub sweep_interval: Duration,
    /// Allowed CORS origins; empty allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            max_send_drops: 100,
            sweep_interval: Duration::from_secs(1),
            cors_origins: Vec::new(),
        }
    }
}

impl From<&PulseSettings> for ServerConfig {
    fn from(settings: &PulseSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            max_send_drops: settings.signaling.max_send_drops,
            sweep_interval: Duration::from_millis(settings.signaling.sweep_interval_ms),
            cors_origins: server.cors_origins.clone(),
        }
    }
}

/// Coordinator switches from the `signaling` settings section.
pub fn coordinator_config(signaling: &SignalingSettings) -> CoordinatorConfig {
    CoordinatorConfig {
        strict_transitions: signaling.strict_transitions,
        ring_timeout: signaling
            .ring_timeout_enabled()
            .then(|| Duration::from_millis(signaling.ring_timeout_ms)),
        profile_lookup_timeout: Duration::from_millis(signaling.profile_lookup_timeout_ms),
    }
}
