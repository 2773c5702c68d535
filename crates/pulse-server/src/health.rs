//! `/health` endpoint.
//!
//! Reports liveness plus the signaling state an operator needs at a glance:
//! how full the registry is and which call-tracking mode is in force.

use std::time::Instant;

use pulse_signaling::SignalingHub;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"full"` while new identities are being turned away.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently bound identities.
    pub connections: usize,
    /// Bound identities allowed before new ones are refused.
    pub max_connections: usize,
    /// Live call sessions.
    pub active_calls: usize,
    /// Whether out-of-order call events are refused.
    pub strict_transitions: bool,
    /// Ring timeout in milliseconds; `null` when unanswered calls never expire.
    pub ring_timeout_ms: Option<u64>,
}

/// Build a health response from the hub's live state.
pub fn health_check(start_time: Instant, hub: &SignalingHub, max_connections: usize) -> HealthResponse {
    let connections = hub.registry().len();
    let calls = hub.calls();
    let config = calls.config();
    HealthResponse {
        status: if connections >= max_connections { "full" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        max_connections,
        active_calls: calls.sessions().len(),
        strict_transitions: config.strict_transitions,
        ring_timeout_ms: config
            .ring_timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
    }
}
