//! Alert listener connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Frames queued for a listener's write task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized alert event.
    Event(Arc<String>),
    /// Liveness probe (WebSocket ping).
    Probe,
    /// Close the transport.
    Close,
}

/// Transport state as seen by the broadcaster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// Upgrade accepted, not yet registered.
    Connecting = 0,
    /// Registered and accepting events.
    Open = 1,
    /// Shutting down; skipped by broadcasts.
    Closing = 2,
}

impl ListenerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closing,
        }
    }
}

/// Result of queueing a frame for a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the write task.
    Queued,
    /// Queue full; frame dropped.
    Full,
    /// Write task gone; the listener is dead.
    Closed,
}

/// A connected alert recipient.
pub struct Listener {
    /// Unique listener ID.
    pub id: String,
    /// Send channel to the listener's write task.
    tx: mpsc::Sender<Outbound>,
    /// When this listener connected.
    pub connected_at: Instant,
    /// Set on probe acknowledgment, cleared by each sweep.
    is_alive: AtomicBool,
    state: AtomicU8,
    dropped_messages: AtomicU64,
    /// Fired when the registry drops this listener; the socket task exits on it.
    disconnect: CancellationToken,
}

impl Listener {
    /// Create a listener in the [`ListenerState::Connecting`] state.
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: id.into(),
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            state: AtomicU8::new(ListenerState::Connecting as u8),
            dropped_messages: AtomicU64::new(0),
            disconnect: CancellationToken::new(),
        }
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: Outbound) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Total frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Current transport state.
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether broadcasts should target this listener.
    pub fn is_ready(&self) -> bool {
        self.state() == ListenerState::Open
    }

    /// Transition to [`ListenerState::Open`].
    pub fn mark_open(&self) {
        self.state.store(ListenerState::Open as u8, Ordering::Release);
    }

    /// Transition to [`ListenerState::Closing`]. Terminal.
    pub fn mark_closing(&self) {
        self.state.store(ListenerState::Closing as u8, Ordering::Release);
    }

    /// Mark closing and signal the socket task to tear down the transport.
    pub fn disconnect(&self) {
        self.mark_closing();
        self.disconnect.cancel();
    }

    /// Whether [`Listener::disconnect`] has been called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }

    /// Resolves once [`Listener::disconnect`] has been called.
    pub async fn disconnected(&self) {
        self.disconnect.cancelled().await;
    }

    /// Record a probe acknowledgment.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Read and clear the liveness flag.
    ///
    /// Returns `true` if the listener acknowledged since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Peek at the liveness flag without clearing it.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("is_alive", &self.is_alive())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}
