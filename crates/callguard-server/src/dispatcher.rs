//! Typed emission of alert events to every registered listener.

use std::sync::Arc;

use callguard_core::{AlertEvent, CallId};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info};

use crate::metrics::{ALERTS_DELIVERED_TOTAL, FRAUD_ALERTS_TOTAL};
use crate::websocket::registry::ListenerRegistry;

/// Call id carried by the canned operator test alert.
pub const TEST_ALERT_CALL_ID: &str = "test-alert";
/// Transcript carried by the canned operator test alert.
pub const TEST_ALERT_TRANSCRIPT: &str = "Test: Please share your OTP for KYC";

/// Builds alert events and fans them out through the registry.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<ListenerRegistry>,
}

impl EventDispatcher {
    /// Create a dispatcher over a registry.
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    /// The registry events go to.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Broadcast an already-built event. Returns the delivered count.
    pub async fn dispatch(&self, event: &AlertEvent) -> usize {
        let delivered = self.registry.broadcast(event).await;
        counter!(ALERTS_DELIVERED_TOTAL).increment(delivered as u64);
        debug!(
            event_type = event.event_type(),
            call_id = %event.call_id(),
            delivered,
            "event dispatched"
        );
        delivered
    }

    /// Emit a `FRAUD_ALERT`.
    pub async fn fraud_alert(
        &self,
        call_id: CallId,
        keywords: Vec<String>,
        transcript: &str,
        transcript_type: &str,
    ) -> usize {
        let event = AlertEvent::fraud_alert(call_id, keywords, transcript, transcript_type);
        counter!(FRAUD_ALERTS_TOTAL).increment(1);
        let delivered = self.dispatch(&event).await;
        if let AlertEvent::FraudAlert {
            severity,
            keywords,
            call_id,
            confidence,
            ..
        } = &event
        {
            info!(
                call_id = %call_id,
                ?severity,
                ?keywords,
                confidence,
                delivered,
                "fraud alert sent"
            );
        }
        delivered
    }

    /// Emit a `SCAM_DATA_CAPTURED`.
    pub async fn scam_data_captured(&self, call_id: CallId, data: Value) -> usize {
        let event = AlertEvent::scam_data_captured(call_id, data);
        let delivered = self.dispatch(&event).await;
        info!(call_id = %event.call_id(), delivered, "scam data captured");
        delivered
    }

    /// Emit a `CALL_STATUS`.
    pub async fn call_status(&self, call_id: CallId, status: &str) -> usize {
        let event = AlertEvent::call_status(call_id, status);
        let delivered = self.dispatch(&event).await;
        info!(call_id = %event.call_id(), status, delivered, "call status sent");
        delivered
    }

    /// Emit the canned operator test alert.
    pub async fn test_alert(&self) -> usize {
        self.fraud_alert(
            CallId::from_raw(TEST_ALERT_CALL_ID),
            vec!["otp".into(), "kyc".into()],
            TEST_ALERT_TRANSCRIPT,
            "final",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::{Listener, Outbound};
    use tokio::sync::mpsc;

    async fn dispatcher_with_listener() -> (EventDispatcher, mpsc::Receiver<Outbound>) {
        let registry = Arc::new(ListenerRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let _ = registry.register(Arc::new(Listener::new("l1", tx))).await;
        (EventDispatcher::new(registry), rx)
    }

    fn next_json(rx: &mut mpsc::Receiver<Outbound>) -> Value {
        match rx.try_recv().unwrap() {
            Outbound::Event(json) => serde_json::from_str(&json).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fraud_alert_shape() {
        let (d, mut rx) = dispatcher_with_listener().await;
        let delivered = d
            .fraud_alert(
                CallId::from_raw("c1"),
                vec!["otp".into()],
                "share otp",
                "partial",
            )
            .await;
        assert_eq!(delivered, 1);

        let v = next_json(&mut rx);
        assert_eq!(v["type"], "FRAUD_ALERT");
        assert_eq!(v["severity"], "MEDIUM");
        assert_eq!(v["confidence"], 30);
        assert_eq!(v["transcriptType"], "partial");
        assert_eq!(v["callId"], "c1");
    }

    #[tokio::test]
    async fn test_alert_is_canned_high_alert() {
        let (d, mut rx) = dispatcher_with_listener().await;
        assert_eq!(d.test_alert().await, 1);

        let v = next_json(&mut rx);
        assert_eq!(v["type"], "FRAUD_ALERT");
        assert_eq!(v["severity"], "HIGH");
        assert_eq!(v["keywords"], serde_json::json!(["otp", "kyc"]));
        assert_eq!(v["transcript"], TEST_ALERT_TRANSCRIPT);
        assert_eq!(v["callId"], TEST_ALERT_CALL_ID);
        assert_eq!(v["confidence"], 60);
    }

    #[tokio::test]
    async fn scam_data_and_status_shapes() {
        let (d, mut rx) = dispatcher_with_listener().await;
        let _ = d
            .scam_data_captured(CallId::from_raw("c2"), serde_json::json!({"upi": "x@y"}))
            .await;
        let _ = d.call_status(CallId::from_raw("c2"), "ended").await;

        let scam = next_json(&mut rx);
        assert_eq!(scam["type"], "SCAM_DATA_CAPTURED");
        assert_eq!(scam["data"]["upi"], "x@y");
        let status = next_json(&mut rx);
        assert_eq!(status["type"], "CALL_STATUS");
        assert_eq!(status["status"], "ended");
    }

    #[tokio::test]
    async fn dispatch_without_listeners_delivers_zero() {
        let d = EventDispatcher::new(Arc::new(ListenerRegistry::new()));
        assert_eq!(d.test_alert().await, 0);
    }
}
