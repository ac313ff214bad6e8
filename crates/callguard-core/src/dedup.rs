//! Per-call alert deduplication.
//!
//! Once a call has produced a fraud alert it stays "alerted" until the
//! provider reports the call ended, or until the entry ages past the
//! configured TTL. The TTL covers calls whose end-of-call status never
//! arrives.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::ids::CallId;

/// Tracks which calls have already fired a fraud alert.
///
/// All operations take a single internal lock, so a check-and-set on the
/// same call from two concurrent webhook deliveries cannot both succeed.
#[derive(Debug, Default)]
pub struct CallDedupTracker {
    alerted: Mutex<HashMap<CallId, Instant>>,
}

impl CallDedupTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `call_id` has already alerted.
    pub fn has_alerted(&self, call_id: &CallId) -> bool {
        self.alerted.lock().contains_key(call_id)
    }

    /// Mark `call_id` as alerted. Re-marking keeps the original timestamp.
    pub fn mark_alerted(&self, call_id: &CallId) {
        let _ = self
            .alerted
            .lock()
            .entry(call_id.clone())
            .or_insert_with(Instant::now);
    }

    /// Atomically mark `call_id` as alerted.
    ///
    /// Returns `true` only for the caller that performed the transition
    /// from not-alerted to alerted.
    pub fn try_mark_alerted(&self, call_id: &CallId) -> bool {
        let mut alerted = self.alerted.lock();
        if alerted.contains_key(call_id) {
            return false;
        }
        let _ = alerted.insert(call_id.clone(), Instant::now());
        true
    }

    /// Forget `call_id`. Returns whether an entry was present.
    pub fn clear(&self, call_id: &CallId) -> bool {
        self.alerted.lock().remove(call_id).is_some()
    }

    /// Drop entries older than `ttl`. Returns how many were removed.
    pub fn prune_expired(&self, ttl: Duration) -> usize {
        let mut alerted = self.alerted.lock();
        let before = alerted.len();
        alerted.retain(|_, marked_at| marked_at.elapsed() < ttl);
        let removed = before - alerted.len();
        if removed > 0 {
            debug!(removed, remaining = alerted.len(), "pruned expired dedup entries");
        }
        removed
    }

    /// Number of calls currently marked as alerted.
    pub fn len(&self) -> usize {
        self.alerted.lock().len()
    }

    /// Whether no call is currently marked.
    pub fn is_empty(&self) -> bool {
        self.alerted.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> CallId {
        CallId::from_raw(s)
    }

    #[test]
    fn new_call_not_alerted() {
        let tracker = CallDedupTracker::new();
        assert!(!tracker.has_alerted(&id("c1")));
        assert!(tracker.is_empty());
    }

    #[test]
    fn mark_then_has_alerted() {
        let tracker = CallDedupTracker::new();
        tracker.mark_alerted(&id("c1"));
        assert!(tracker.has_alerted(&id("c1")));
        assert!(!tracker.has_alerted(&id("c2")));
    }

    #[test]
    fn mark_is_idempotent() {
        let tracker = CallDedupTracker::new();
        tracker.mark_alerted(&id("c1"));
        tracker.mark_alerted(&id("c1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn clear_resets_state() {
        let tracker = CallDedupTracker::new();
        tracker.mark_alerted(&id("c1"));
        assert!(tracker.clear(&id("c1")));
        assert!(!tracker.has_alerted(&id("c1")));
    }

    #[test]
    fn clear_absent_is_noop() {
        let tracker = CallDedupTracker::new();
        assert!(!tracker.clear(&id("missing")));
        assert!(!tracker.clear(&id("missing")));
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn try_mark_only_first_wins() {
        let tracker = CallDedupTracker::new();
        assert!(tracker.try_mark_alerted(&id("c1")));
        assert!(!tracker.try_mark_alerted(&id("c1")));
        let _ = tracker.clear(&id("c1"));
        assert!(tracker.try_mark_alerted(&id("c1")));
    }

    #[test]
    fn concurrent_try_mark_single_winner() {
        let tracker = Arc::new(CallDedupTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let t = Arc::clone(&tracker);
                std::thread::spawn(move || t.try_mark_alerted(&CallId::from_raw("race")))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn prune_removes_only_expired() {
        let tracker = CallDedupTracker::new();
        tracker.mark_alerted(&id("old"));
        std::thread::sleep(Duration::from_millis(300));
        tracker.mark_alerted(&id("fresh"));

        // "old" is at least 300ms past marking; "fresh" has 10s of headroom.
        let removed = tracker.prune_expired(Duration::from_millis(150));
        assert_eq!(removed, 1);
        assert!(!tracker.has_alerted(&id("old")));
        assert!(tracker.has_alerted(&id("fresh")));
    }

    #[test]
    fn prune_with_long_ttl_keeps_everything() {
        let tracker = CallDedupTracker::new();
        tracker.mark_alerted(&id("a"));
        tracker.mark_alerted(&id("b"));
        assert_eq!(tracker.prune_expired(Duration::from_secs(3600)), 0);
        assert_eq!(tracker.len(), 2);
    }
}
