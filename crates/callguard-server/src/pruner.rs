//! Periodic eviction of stale dedup entries.

use std::sync::Arc;
use std::time::Duration;

use callguard_core::CallDedupTracker;
use metrics::counter;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::DEDUP_ENTRIES_EVICTED_TOTAL;

/// Prune entries older than `ttl` every `interval` until `cancel` fires.
///
/// Covers calls whose terminal status update never arrived.
pub async fn run_dedup_pruner(
    dedup: Arc<CallDedupTracker>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = dedup.prune_expired(ttl);
                if removed > 0 {
                    counter!(DEDUP_ENTRIES_EVICTED_TOTAL).increment(removed as u64);
                    debug!(removed, remaining = dedup.len(), "dedup prune");
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}
