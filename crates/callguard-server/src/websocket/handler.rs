//! Per-connection WebSocket lifecycle: register, pump frames, unregister.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::connection::{Listener, Outbound};
use super::registry::ListenerRegistry;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// How long the writer may keep flushing after the registry disconnects a listener.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Generate a fresh listener ID.
pub fn new_listener_id() -> String {
    format!("lst_{}", Uuid::now_v7())
}

/// Drive one upgraded WebSocket until either side closes.
///
/// The writer half drains the listener's outbound queue; the reader half
/// records probe acknowledgments and ignores inbound application data.
/// When the registry disconnects the listener (liveness or slow-consumer
/// eviction, shutdown) the writer gets [`CLOSE_GRACE`] to send a close
/// frame, then both halves are aborted and the transport is dropped.
pub async fn handle_socket(
    socket: WebSocket,
    registry: Arc<ListenerRegistry>,
    queue_capacity: usize,
) {
    let (tx, mut rx) = mpsc::channel::<Outbound>(queue_capacity);
    let listener = Arc::new(Listener::new(new_listener_id(), tx));
    let listener_id = listener.id.clone();
    let _ = registry.register(Arc::clone(&listener)).await;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(listener_id = %listener_id, listeners = registry.len(), "listener connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_listener = Arc::clone(&listener);
    let mut writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = rx.recv() => frame,
                () = writer_listener.disconnected() => Some(Outbound::Close),
            };
            let Some(frame) = frame else { break };
            let message = match frame {
                Outbound::Event(json) => Message::Text(json.as_str().to_owned().into()),
                Outbound::Probe => Message::Ping(Vec::new().into()),
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(message).await.is_err() {
                debug!(listener_id = %writer_listener.id, "write failed, closing");
                break;
            }
        }
    });

    let reader_registry = Arc::clone(&registry);
    let reader_id = listener_id.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Pong(_) => {
                    if reader_registry.mark_live(&reader_id).await {
                        trace!(listener_id = %reader_id, "probe acknowledged");
                    }
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!(listener_id = %reader_id, len = text.len(), "ignoring inbound text");
                }
                Message::Binary(_) | Message::Ping(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        () = listener.disconnected() => {
            reader.abort();
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                debug!(listener_id = %listener_id, "close frame not flushed, dropping transport");
                writer.abort();
            }
        }
    }

    listener.mark_closing();
    let _ = registry.unregister(&listener_id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(
        listener_id = %listener_id,
        connected_secs = listener.age().as_secs(),
        listeners = registry.len(),
        "listener disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_ids_are_unique_and_prefixed() {
        let a = new_listener_id();
        let b = new_listener_id();
        assert!(a.starts_with("lst_"));
        assert_ne!(a, b);
    }
}
