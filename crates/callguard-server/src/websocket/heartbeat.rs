//! Periodic liveness sweep over all registered listeners.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::ListenerRegistry;

/// Outcome of the sweep loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepLoopExit {
    /// The loop was cancelled externally.
    Cancelled,
}

/// Run the liveness sweep every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after start, so a listener
/// gets at least one interval to acknowledge before it can be terminated.
pub async fn run_liveness_sweep(
    registry: Arc<ListenerRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> SweepLoopExit {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = registry.sweep().await;
                debug!(
                    probed = report.probed,
                    evicted = report.evicted.len(),
                    "liveness sweep"
                );
            }
            () = cancel.cancelled() => {
                return SweepLoopExit::Cancelled;
            }
        }
    }
}
