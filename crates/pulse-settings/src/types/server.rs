//! HTTP/WebSocket listener settings.

use serde::{Deserialize, Serialize};

/// Server network and connection-handling settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` lets the OS pick one).
    pub port: u16,
    /// Maximum number of concurrently bound connections.
    pub max_connections: usize,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A client silent for this long is disconnected.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity (frames).
    pub send_queue_capacity: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            max_connections: 1000,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            cors_origins: Vec::new(),
        }
    }
}
