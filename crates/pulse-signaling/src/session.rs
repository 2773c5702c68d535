//! Per-pair call session records.
//!
//! A record exists only while a call between two identities is live
//! (`Requested`, `Accepted` or `Active`). Reaching a terminal state removes
//! it; absence means the pair is idle.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_core::ids::Identity;
use thiserror::Error;
use tokio::time::Instant;

/// Lifecycle state of one call attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Caller has rung the callee.
    Requested,
    /// Callee picked up; negotiation may start.
    Accepted,
    /// Negotiation traffic has flowed between the parties.
    Active,
    /// Hung up by either party.
    Ended,
    /// Declined by the callee.
    Rejected,
    /// Abandoned (unanswered or failed).
    Errored,
}

impl CallState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Rejected | Self::Errored)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use CallState::{Accepted, Active, Ended, Errored, Rejected, Requested};
        matches!(
            (self, next),
            (Requested, Accepted | Rejected | Ended | Errored)
                | (Accepted, Active | Ended)
                | (Active, Ended)
        )
    }
}

/// Ordered (caller, callee) pair identifying a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallKey {
    /// Identity that sent `call-request`.
    pub caller: Identity,
    /// Identity that was rung.
    pub callee: Identity,
}

impl CallKey {
    /// Build a key.
    pub fn new(caller: Identity, callee: Identity) -> Self {
        Self { caller, callee }
    }

    /// Whether `identity` is either party.
    pub fn involves(&self, identity: &Identity) -> bool {
        &self.caller == identity || &self.callee == identity
    }

    fn reversed(&self) -> Self {
        Self::new(self.callee.clone(), self.caller.clone())
    }
}

/// A live call record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSession {
    /// Caller and callee.
    pub key: CallKey,
    /// Current state.
    pub state: CallState,
    /// When the call was requested.
    pub requested_at: Instant,
    /// When the state last changed.
    pub updated_at: Instant,
}

/// Why a transition was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// No live record for the pair.
    #[error("no call session")]
    NoSession,
    /// The record is in a state that does not allow the transition.
    #[error("illegal transition {from:?} -> {to:?}")]
    Illegal {
        /// Current state.
        from: CallState,
        /// Requested state.
        to: CallState,
    },
}

/// Table of live call sessions keyed by (caller, callee).
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<CallKey, CallSession>>,
}

impl SessionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a call in `Requested`, replacing any record for the same key.
    ///
    /// Returns the replaced record.
    pub fn open(&self, key: CallKey, now: Instant) -> Option<CallSession> {
        let session = CallSession {
            key: key.clone(),
            state: CallState::Requested,
            requested_at: now,
            updated_at: now,
        };
        self.sessions.lock().insert(key, session)
    }

    /// Start a call in `Requested` only if the pair has no live record in
    /// either orientation. Check and insert happen under one lock.
    ///
    /// Returns the conflicting record on refusal.
    pub fn open_if_idle(&self, key: CallKey, now: Instant) -> Result<(), CallSession> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&key).or_else(|| sessions.get(&key.reversed())) {
            return Err(existing.clone());
        }
        let session = CallSession {
            key: key.clone(),
            state: CallState::Requested,
            requested_at: now,
            updated_at: now,
        };
        let _ = sessions.insert(key, session);
        Ok(())
    }

    /// Current record for `key`.
    pub fn get(&self, key: &CallKey) -> Option<CallSession> {
        self.sessions.lock().get(key).cloned()
    }

    /// Live record between `a` and `b` in either orientation (`a` as caller first).
    pub fn find_between(&self, a: &Identity, b: &Identity) -> Option<CallSession> {
        let key = CallKey::new(a.clone(), b.clone());
        let sessions = self.sessions.lock();
        sessions
            .get(&key)
            .or_else(|| sessions.get(&key.reversed()))
            .cloned()
    }

    /// Move the record for `key` to `to`, removing it if `to` is terminal.
    ///
    /// Returns the previous state.
    pub fn advance(&self, key: &CallKey, to: CallState, now: Instant) -> Result<CallState, TransitionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(key).ok_or(TransitionError::NoSession)?;
        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Illegal { from, to });
        }
        if to.is_terminal() {
            let _ = sessions.remove(key);
        } else {
            session.state = to;
            session.updated_at = now;
        }
        Ok(from)
    }

    /// Remove the live record between `a` and `b` (either orientation).
    pub fn end_between(&self, a: &Identity, b: &Identity) -> Option<CallSession> {
        let key = CallKey::new(a.clone(), b.clone());
        let mut sessions = self.sessions.lock();
        sessions
            .remove(&key)
            .or_else(|| sessions.remove(&key.reversed()))
    }

    /// Promote an `Accepted` record between `a` and `b` to `Active`.
    ///
    /// Returns `true` if a record was promoted.
    pub fn mark_active(&self, a: &Identity, b: &Identity, now: Instant) -> bool {
        let key = CallKey::new(a.clone(), b.clone());
        let mut sessions = self.sessions.lock();
        for k in [key.reversed(), key] {
            match sessions.get_mut(&k) {
                Some(session) if session.state == CallState::Accepted => {
                    session.state = CallState::Active;
                    session.updated_at = now;
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Drop every record involving `identity`. Returns how many were removed.
    pub fn purge_involving(&self, identity: &Identity) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|key, _| !key.involves(identity));
        before - sessions.len()
    }

    /// Remove `Requested` records rung for at least `ring_timeout`.
    ///
    /// The returned sessions are in state `Errored`.
    pub fn expire_requested(&self, ring_timeout: Duration, now: Instant) -> Vec<CallSession> {
        let mut sessions = self.sessions.lock();
        let stale: Vec<CallKey> = sessions
            .iter()
            .filter(|(_, s)| {
                s.state == CallState::Requested && now.saturating_duration_since(s.requested_at) >= ring_timeout
            })
            .map(|(k, _)| k.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|k| sessions.remove(&k))
            .map(|mut s| {
                s.state = CallState::Errored;
                s.updated_at = now;
                s
            })
            .collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no call is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    fn key(caller: &str, callee: &str) -> CallKey {
        CallKey::new(id(caller), id(callee))
    }

    #[test]
    fn legal_transitions() {
        use CallState::*;
        assert!(Requested.can_transition_to(Accepted));
        assert!(Requested.can_transition_to(Rejected));
        assert!(Requested.can_transition_to(Errored));
        assert!(Accepted.can_transition_to(Active));
        assert!(Accepted.can_transition_to(Ended));
        assert!(Active.can_transition_to(Ended));

        assert!(!Accepted.can_transition_to(Rejected));
        assert!(!Active.can_transition_to(Accepted));
        assert!(!Ended.can_transition_to(Requested));
        assert!(!Requested.can_transition_to(Active));
    }

    #[test]
    fn terminal_states() {
        assert!(CallState::Ended.is_terminal());
        assert!(CallState::Rejected.is_terminal());
        assert!(CallState::Errored.is_terminal());
        assert!(!CallState::Active.is_terminal());
    }

    #[test]
    fn full_lifecycle_removes_record() {
        let table = SessionTable::new();
        let now = Instant::now();
        let k = key("a", "b");
        assert!(table.open(k.clone(), now).is_none());
        assert_eq!(table.advance(&k, CallState::Accepted, now), Ok(CallState::Requested));
        assert!(table.mark_active(&id("a"), &id("b"), now));
        assert_eq!(table.get(&k).unwrap().state, CallState::Active);
        assert_eq!(table.advance(&k, CallState::Ended, now), Ok(CallState::Active));
        assert!(table.is_empty());
    }

    #[test]
    fn advance_without_record() {
        let table = SessionTable::new();
        assert_eq!(
            table.advance(&key("a", "b"), CallState::Accepted, Instant::now()),
            Err(TransitionError::NoSession)
        );
    }

    #[test]
    fn illegal_advance_keeps_record() {
        let table = SessionTable::new();
        let now = Instant::now();
        let k = key("a", "b");
        let _ = table.open(k.clone(), now);
        let _ = table.advance(&k, CallState::Accepted, now);
        assert_matches!(
            table.advance(&k, CallState::Rejected, now),
            Err(TransitionError::Illegal {
                from: CallState::Accepted,
                to: CallState::Rejected
            })
        );
        assert_eq!(table.get(&k).unwrap().state, CallState::Accepted);
    }

    #[test]
    fn open_replaces_existing_record() {
        let table = SessionTable::new();
        let now = Instant::now();
        let k = key("a", "b");
        let _ = table.open(k.clone(), now);
        let _ = table.advance(&k, CallState::Accepted, now);
        let replaced = table.open(k.clone(), now).unwrap();
        assert_eq!(replaced.state, CallState::Accepted);
        assert_eq!(table.get(&k).unwrap().state, CallState::Requested);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn open_if_idle_refuses_either_orientation() {
        let table = SessionTable::new();
        let now = Instant::now();
        assert_eq!(table.open_if_idle(key("a", "b"), now), Ok(()));

        let conflict = table.open_if_idle(key("a", "b"), now).unwrap_err();
        assert_eq!(conflict.key, key("a", "b"));
        let conflict = table.open_if_idle(key("b", "a"), now).unwrap_err();
        assert_eq!(conflict.key, key("a", "b"));
        assert_eq!(table.len(), 1);

        assert_eq!(table.open_if_idle(key("a", "c"), now), Ok(()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn lookups_work_in_either_orientation() {
        let table = SessionTable::new();
        let _ = table.open(key("a", "b"), Instant::now());
        assert!(table.find_between(&id("b"), &id("a")).is_some());
        assert!(table.find_between(&id("a"), &id("c")).is_none());
        let ended = table.end_between(&id("b"), &id("a")).unwrap();
        assert_eq!(ended.key, key("a", "b"));
        assert!(table.is_empty());
    }

    #[test]
    fn mark_active_ignores_requested() {
        let table = SessionTable::new();
        let _ = table.open(key("a", "b"), Instant::now());
        assert!(!table.mark_active(&id("a"), &id("b"), Instant::now()));
    }

    #[test]
    fn purge_drops_every_record_of_identity() {
        let table = SessionTable::new();
        let now = Instant::now();
        let _ = table.open(key("a", "b"), now);
        let _ = table.open(key("c", "a"), now);
        let _ = table.open(key("c", "d"), now);
        assert_eq!(table.purge_involving(&id("a")), 2);
        assert_eq!(table.len(), 1);
        assert!(table.get(&key("c", "d")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_only_stale_requested() {
        let table = SessionTable::new();
        let start = Instant::now();
        let _ = table.open(key("a", "b"), start);
        let _ = table.open(key("c", "d"), start);
        let _ = table.advance(&key("c", "d"), CallState::Accepted, start);

        tokio::time::advance(Duration::from_secs(10)).await;
        let _ = table.open(key("e", "f"), Instant::now());

        let expired = table.expire_requested(Duration::from_secs(10), Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key, key("a", "b"));
        assert_eq!(expired[0].state, CallState::Errored);
        assert_eq!(table.len(), 2);
    }
}
