//! Ordered server teardown: listeners first, then background tasks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::websocket::registry::ListenerRegistry;

/// Default time budget for draining background tasks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// What [`ShutdownCoordinator::drain`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Listeners sent a close frame and disconnected.
    pub listeners_closed: usize,
    /// Tracked tasks that exited within the deadline.
    pub tasks_finished: Vec<&'static str>,
    /// Tracked tasks aborted at the deadline.
    pub tasks_aborted: Vec<&'static str>,
}

/// Owns the stop signal and the named background tasks it governs.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Stop signal observed by tracked tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether [`ShutdownCoordinator::drain`] has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a task to be awaited (or aborted) on drain.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Number of tasks still tracked.
    pub fn tracked_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Close every listener, fire the stop signal, then wait for tracked
    /// tasks until `timeout` elapses. Stragglers are aborted.
    pub async fn drain(&self, registry: &ListenerRegistry, timeout: Duration) -> ShutdownReport {
        let mut report = ShutdownReport {
            listeners_closed: registry.close_all().await,
            ..ShutdownReport::default()
        };
        self.token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(
            listeners = report.listeners_closed,
            tasks = tasks.len(),
            timeout_ms = timeout.as_millis() as u64,
            "shutting down"
        );

        let deadline = Instant::now() + timeout;
        for (name, mut handle) in tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {
                    debug!(task = name, "task stopped");
                    report.tasks_finished.push(name);
                }
                Ok(Err(e)) => {
                    warn!(task = name, error = %e, "task ended abnormally");
                    report.tasks_finished.push(name);
                }
                Err(_) => {
                    warn!(task = name, "task still running at shutdown deadline, aborting");
                    handle.abort();
                    report.tasks_aborted.push(name);
                }
            }
        }
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::websocket::connection::{Listener, Outbound};

    #[test]
    fn starts_idle() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.tracked_count(), 0);
    }

    #[tokio::test]
    async fn drain_closes_listeners_before_stopping_tasks() {
        let coord = ShutdownCoordinator::new();
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let listener = Arc::new(Listener::new("l1", tx));
        let _ = registry.register(Arc::clone(&listener)).await;

        let token = coord.token();
        coord.track("worker", tokio::spawn(async move { token.cancelled().await }));
        assert_eq!(coord.tracked_count(), 1);

        let report = coord.drain(&registry, DEFAULT_SHUTDOWN_TIMEOUT).await;
        assert_eq!(report.listeners_closed, 1);
        assert_eq!(report.tasks_finished, vec!["worker"]);
        assert!(report.tasks_aborted.is_empty());
        assert!(coord.is_shutting_down());
        assert_eq!(coord.tracked_count(), 0);
        assert!(registry.is_empty());
        assert!(listener.is_disconnected());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_tasks_past_deadline() {
        let coord = ShutdownCoordinator::new();
        let registry = ListenerRegistry::new();
        let token = coord.token();
        coord.track("polite", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "stuck",
            tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await }),
        );

        let report = coord.drain(&registry, Duration::from_millis(50)).await;
        assert_eq!(report.listeners_closed, 0);
        assert_eq!(report.tasks_finished, vec!["polite"]);
        assert_eq!(report.tasks_aborted, vec!["stuck"]);
    }

    #[tokio::test]
    async fn second_drain_is_a_noop() {
        let coord = ShutdownCoordinator::new();
        let registry = ListenerRegistry::new();
        let _ = coord.drain(&registry, DEFAULT_SHUTDOWN_TIMEOUT).await;
        let again = coord.drain(&registry, DEFAULT_SHUTDOWN_TIMEOUT).await;
        assert_eq!(again, ShutdownReport::default());
    }
}
