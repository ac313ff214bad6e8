//! Registered alert listeners and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use callguard_core::AlertEvent;
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::{Listener, Outbound, SendOutcome};
use crate::metrics::{
    LIVENESS_EVICTIONS_TOTAL, WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE,
};

/// Maximum total lifetime frame drops before evicting a slow listener.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Outcome of one liveness sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Listeners that stayed registered and were probed.
    pub probed: usize,
    /// IDs of listeners terminated for missing the previous probe.
    pub evicted: Vec<String>,
}

/// The set of currently connected listeners.
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Arc<Listener>>>,
    /// Tracks map size so count queries skip the lock.
    active_count: AtomicUsize,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a listener, mark it open and live.
    ///
    /// Returns `false` if a listener with the same ID was already registered.
    pub async fn register(&self, listener: Arc<Listener>) -> bool {
        listener.mark_open();
        listener.mark_alive();
        let mut map = self.listeners.write().await;
        let inserted = map.insert(listener.id.clone(), listener).is_none();
        if inserted {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        gauge!(WS_CONNECTIONS_ACTIVE).set(map.len() as f64);
        inserted
    }

    /// Remove a listener and signal its socket task to close. Idempotent.
    pub async fn unregister(&self, listener_id: &str) -> Option<Arc<Listener>> {
        let mut map = self.listeners.write().await;
        let removed = map.remove(listener_id);
        if let Some(listener) = &removed {
            listener.disconnect();
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            gauge!(WS_CONNECTIONS_ACTIVE).set(map.len() as f64);
        }
        removed
    }

    /// Record a probe acknowledgment for a listener.
    ///
    /// Returns `false` if the listener is not registered.
    pub async fn mark_live(&self, listener_id: &str) -> bool {
        let map = self.listeners.read().await;
        match map.get(listener_id) {
            Some(listener) => {
                listener.mark_alive();
                true
            }
            None => false,
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize an event once and queue it to every open listener.
    ///
    /// Returns the number of listeners the frame was queued to. Listeners
    /// whose write task is gone, or that exceeded [`MAX_TOTAL_DROPS`], are
    /// removed.
    pub async fn broadcast(&self, event: &AlertEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };

        let recipients: Vec<Arc<Listener>> = {
            let map = self.listeners.read().await;
            map.values().filter(|l| l.is_ready()).cloned().collect()
        };

        let mut delivered = 0usize;
        let mut to_remove = Vec::new();
        for listener in &recipients {
            match listener.send(Outbound::Event(Arc::clone(&json))) {
                SendOutcome::Queued => delivered += 1,
                SendOutcome::Full => {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    let drops = listener.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(listener_id = %listener.id, drops, "evicting slow listener");
                        to_remove.push(listener.id.clone());
                    } else {
                        warn!(listener_id = %listener.id, total_drops = drops, "listener queue full, event dropped");
                    }
                }
                SendOutcome::Closed => {
                    debug!(listener_id = %listener.id, "listener channel closed during broadcast");
                    to_remove.push(listener.id.clone());
                }
            }
        }
        debug!(
            event_type = event.event_type(),
            recipients = recipients.len(),
            delivered,
            "broadcast event"
        );

        for id in &to_remove {
            let _ = self.unregister(id).await;
        }
        delivered
    }

    /// Terminate listeners that missed the previous probe, then probe the rest.
    ///
    /// Survivors have their liveness flag cleared; it must be set again by
    /// an acknowledgment before the next sweep.
    pub async fn sweep(&self) -> SweepReport {
        let snapshot: Vec<Arc<Listener>> = {
            let map = self.listeners.read().await;
            map.values().cloned().collect()
        };

        let mut report = SweepReport::default();
        for listener in snapshot {
            if !listener.check_alive() {
                let _ = listener.send(Outbound::Close);
                report.evicted.push(listener.id.clone());
                continue;
            }
            if listener.send(Outbound::Probe) == SendOutcome::Closed {
                report.evicted.push(listener.id.clone());
            } else {
                report.probed += 1;
            }
        }

        for id in &report.evicted {
            if self.unregister(id).await.is_some() {
                counter!(LIVENESS_EVICTIONS_TOTAL).increment(1);
                info!(listener_id = %id, "terminated unresponsive listener");
            }
        }
        report
    }

    /// Queue a close frame to every listener and clear the registry.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Listener>> = {
            let mut map = self.listeners.write().await;
            map.drain().map(|(_, l)| l).collect()
        };
        for listener in &drained {
            let _ = listener.send(Outbound::Close);
            listener.disconnect();
        }
        self.active_count.store(0, Ordering::Relaxed);
        gauge!(WS_CONNECTIONS_ACTIVE).set(0.0);
        drained.len()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
