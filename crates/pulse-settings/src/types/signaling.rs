//! Call coordination settings.

use serde::{Deserialize, Serialize};

/// Behavior of the call session coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalingSettings {
    /// Refuse out-of-order call events instead of forwarding them.
    pub strict_transitions: bool,
    /// Unanswered calls are cancelled after this many milliseconds. `0` disables.
    pub ring_timeout_ms: u64,
    /// How often the ring-timeout sweeper runs.
    pub sweep_interval_ms: u64,
    /// Upper bound on a single caller profile lookup.
    pub profile_lookup_timeout_ms: u64,
    /// Dropped outbound frames after which a connection is force-closed.
    pub max_send_drops: u64,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            strict_transitions: false,
            ring_timeout_ms: 0,
            sweep_interval_ms: 1000,
            profile_lookup_timeout_ms: 5000,
            max_send_drops: 100,
        }
    }
}

impl SignalingSettings {
    /// Whether the ring-timeout sweeper should run.
    pub fn ring_timeout_enabled(&self) -> bool {
        self.ring_timeout_ms > 0
    }
}
