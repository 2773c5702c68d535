//! Call lifecycle coordination.
//!
//! Each call event resolves its target in the registry and forwards the
//! matching outbound event. A [`SessionTable`] tracks the state of every
//! live (caller, callee) pair:
//!
//! - **Permissive** (default): the table is kept for observability and the
//!   ring timeout, but never blocks a forward. A repeated `call-request`
//!   replaces the pair's record.
//! - **Strict**: `call-accepted`/`call-rejected` need a `Requested` record
//!   rung by the event's target, `call-ended` needs a live record between the
//!   pair, and `call-request` is refused while one exists.
//!
//! A disconnect purges the departing identity's records without telling the
//! peer; the peer only sees the presence update.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use pulse_core::events::{CALL_ACCEPTED, CALL_ENDED, CALL_REJECTED, CallerProfile, ServerEvent};
use pulse_core::ids::Identity;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SignalingError;
use crate::profile::{Profile, ProfileError, ProfileLookup};
use crate::registry::ConnectionRegistry;
use crate::session::{CallKey, CallState, SessionTable, TransitionError};

/// `call-error` text sent to a caller whose call rang out.
pub const MSG_NOT_ANSWERED: &str = "Call was not answered";

/// Coordinator behavior switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Refuse out-of-order call events.
    pub strict_transitions: bool,
    /// Cancel calls left ringing this long. `None` disables.
    pub ring_timeout: Option<Duration>,
    /// Upper bound on the caller profile lookup.
    pub profile_lookup_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            strict_transitions: false,
            ring_timeout: None,
            profile_lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives call sessions between pairs of online identities.
pub struct CallCoordinator {
    registry: Arc<ConnectionRegistry>,
    sessions: SessionTable,
    profiles: Arc<dyn ProfileLookup>,
    config: CoordinatorConfig,
}

impl CallCoordinator {
    /// Create a coordinator over `registry`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        profiles: Arc<dyn ProfileLookup>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            sessions: SessionTable::new(),
            profiles,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Live call records.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// `call-request` from `caller` to `callee`.
    ///
    /// Looks up the caller's profile (bounded by the configured timeout)
    /// before ringing. A lookup failure leaves no record behind.
    pub async fn request(&self, caller: &Identity, callee: Identity) -> Result<(), SignalingError> {
        if self.registry.resolve(&callee).is_none() {
            return Err(SignalingError::TargetOffline(callee));
        }
        // Fast path; the authoritative check is `open_if_idle` below.
        if self.config.strict_transitions && self.sessions.find_between(caller, &callee).is_some() {
            return Err(SignalingError::CallInProgress(callee));
        }

        let profile = self.lookup_profile(caller).await?;

        // The callee may have left while the lookup was in flight.
        let Some(target) = self.registry.resolve(&callee) else {
            return Err(SignalingError::TargetOffline(callee));
        };

        let key = CallKey::new(caller.clone(), callee.clone());
        if self.config.strict_transitions {
            // A crossing request may have opened the pair during the lookup.
            if let Err(existing) = self.sessions.open_if_idle(key, Instant::now()) {
                debug!(%caller, %callee, existing = ?existing.key, "call-request lost race for pair");
                return Err(SignalingError::CallInProgress(callee));
            }
        } else if let Some(previous) = self.sessions.open(key, Instant::now()) {
            debug!(%caller, %callee, previous = ?previous.state, "call-request replaced existing session");
        }
        self.record_sessions();

        let event = ServerEvent::CallRequest {
            from_user: CallerProfile {
                id: caller.clone(),
                display_name: profile.display_name,
                avatar_ref: profile.avatar_ref,
            },
            target_user_id: caller.clone(),
        };
        let _ = target.send_event(&event);
        counter!("call_events_total", "event" => event.name()).increment(1);
        info!(%caller, %callee, "call requested");
        Ok(())
    }

    /// `call-accepted` from `callee` back to `caller`.
    pub fn accept(&self, callee: &Identity, caller: Identity) -> Result<(), SignalingError> {
        let Some(target) = self.registry.resolve(&caller) else {
            return Err(SignalingError::TargetOffline(caller));
        };
        let key = CallKey::new(caller.clone(), callee.clone());
        self.transition(&key, CallState::Accepted, CALL_ACCEPTED)?;

        let _ = target.send_event(&ServerEvent::CallAccepted {
            target_user_id: callee.clone(),
            accepted_by: callee.clone(),
        });
        counter!("call_events_total", "event" => CALL_ACCEPTED).increment(1);
        info!(%caller, %callee, "call accepted");
        Ok(())
    }

    /// `call-rejected` from `callee` back to `caller`.
    pub fn reject(&self, callee: &Identity, caller: Identity) -> Result<(), SignalingError> {
        let Some(target) = self.registry.resolve(&caller) else {
            return Err(SignalingError::TargetOffline(caller));
        };
        let key = CallKey::new(caller.clone(), callee.clone());
        self.transition(&key, CallState::Rejected, CALL_REJECTED)?;

        let _ = target.send_event(&ServerEvent::CallRejected {});
        counter!("call_events_total", "event" => CALL_REJECTED).increment(1);
        info!(%caller, %callee, "call rejected");
        Ok(())
    }

    /// `call-ended` from either party.
    pub fn end(&self, sender: &Identity, peer: Identity) -> Result<(), SignalingError> {
        let Some(target) = self.registry.resolve(&peer) else {
            return Err(SignalingError::TargetOffline(peer));
        };
        let ended = self.sessions.end_between(sender, &peer);
        if ended.is_none() {
            if self.config.strict_transitions {
                return Err(SignalingError::OutOfOrder {
                    event: CALL_ENDED,
                    peer,
                });
            }
            debug!(%sender, %peer, "call-ended without a tracked session");
        }
        self.record_sessions();

        let _ = target.send_event(&ServerEvent::CallEnded {});
        counter!("call_events_total", "event" => CALL_ENDED).increment(1);
        info!(%sender, %peer, "call ended");
        Ok(())
    }

    /// Note negotiation traffic between `a` and `b`.
    ///
    /// Moves an `Accepted` call between them to `Active`. Never blocks the
    /// signal itself.
    pub fn observe_signal(&self, a: &Identity, b: &Identity) {
        if self.sessions.mark_active(a, b, Instant::now()) {
            debug!(%a, %b, "call active");
        }
    }

    /// Forget every call involving an identity that went offline.
    pub fn on_disconnect(&self, identity: &Identity) {
        let purged = self.sessions.purge_involving(identity);
        if purged > 0 {
            self.record_sessions();
            debug!(%identity, purged, "dropped call sessions of departed identity");
        }
    }

    /// Cancel calls that have been ringing for longer than the ring timeout.
    ///
    /// The caller gets `call-error`, the callee `call-ended`. Returns the
    /// number of calls expired.
    pub fn expire_stale(&self, now: Instant) -> usize {
        let Some(ring_timeout) = self.config.ring_timeout else {
            return 0;
        };
        let expired = self.sessions.expire_requested(ring_timeout, now);
        for session in &expired {
            let CallKey { caller, callee } = &session.key;
            if let Some(conn) = self.registry.resolve(caller) {
                let _ = conn.send_event(&ServerEvent::CallError {
                    message: MSG_NOT_ANSWERED.to_owned(),
                });
            }
            if let Some(conn) = self.registry.resolve(callee) {
                let _ = conn.send_event(&ServerEvent::CallEnded {});
            }
            info!(%caller, %callee, "unanswered call expired");
        }
        if !expired.is_empty() {
            counter!("calls_expired_total").increment(expired.len() as u64);
            self.record_sessions();
        }
        expired.len()
    }

    /// Spawn the ring-timeout sweeper. Returns `None` when timeouts are disabled.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.config.ring_timeout?;
        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = coordinator.expire_stale(Instant::now());
                    }
                    () = cancel.cancelled() => {
                        debug!("ring-timeout sweeper stopped");
                        return;
                    }
                }
            }
        }))
    }

    fn transition(&self, key: &CallKey, to: CallState, event: &'static str) -> Result<(), SignalingError> {
        match self.sessions.advance(key, to, Instant::now()) {
            Ok(_) => {
                self.record_sessions();
                Ok(())
            }
            Err(e) if self.config.strict_transitions => {
                debug!(caller = %key.caller, callee = %key.callee, event, error = %e, "refusing out-of-order call event");
                Err(SignalingError::OutOfOrder {
                    event,
                    peer: key.caller.clone(),
                })
            }
            Err(TransitionError::NoSession) => {
                debug!(caller = %key.caller, callee = %key.callee, event, "forwarding untracked call event");
                Ok(())
            }
            Err(e) => {
                debug!(caller = %key.caller, callee = %key.callee, event, error = %e, "forwarding call event despite state");
                Ok(())
            }
        }
    }

    async fn lookup_profile(&self, caller: &Identity) -> Result<Profile, SignalingError> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(self.config.profile_lookup_timeout, self.profiles.lookup(caller)).await;
        histogram!("profile_lookup_duration_seconds").record(started.elapsed().as_secs_f64());

        let failure = match result {
            Ok(Ok(profile)) => return Ok(profile),
            Ok(Err(e)) => e,
            Err(_) => ProfileError::Unavailable(format!(
                "lookup timed out after {}ms",
                self.config.profile_lookup_timeout.as_millis()
            )),
        };
        warn!(%caller, error = %failure, "caller profile lookup failed");
        Err(SignalingError::ProfileLookupFailed {
            identity: caller.clone(),
            source: failure,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_sessions(&self) {
        gauge!("call_sessions_active").set(self.sessions.len() as f64);
    }
}
