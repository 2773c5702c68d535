//! Liveness checks for idle clients.

use std::time::Duration;

use pulse_signaling::ClientConnection;
use tokio::time::{Interval, MissedTickBehavior};

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Keep the connection; send another ping.
    Alive,
    /// Nothing heard within the timeout; close it.
    Unresponsive,
}

/// Ping cadence and the silence a client is allowed.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
}

impl Heartbeat {
    /// Ping every `interval`; give up after `timeout` of silence.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Ticker whose first tick fires one interval from now.
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Check a connection on a tick.
    ///
    /// Any inbound frame (including pongs) marks the connection alive; the
    /// flag is cleared on every check.
    pub fn check(&self, conn: &ClientConnection) -> Liveness {
        if !conn.check_alive() && conn.last_seen_elapsed() > self.timeout {
            Liveness::Unresponsive
        } else {
            Liveness::Alive
        }
    }
}
