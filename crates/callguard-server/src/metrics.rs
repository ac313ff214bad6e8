//! Metric name constants and the `/metrics` render helper.

use metrics_exporter_prometheus::PrometheusHandle;

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Webhook events received (counter, labels: kind).
pub const WEBHOOK_EVENTS_TOTAL: &str = "webhook_events_total";
/// Fraud alerts raised (counter).
pub const FRAUD_ALERTS_TOTAL: &str = "fraud_alerts_total";
/// Alert frames queued to listeners (counter).
pub const ALERTS_DELIVERED_TOTAL: &str = "alerts_delivered_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Listeners evicted by the liveness sweep (counter).
pub const LIVENESS_EVICTIONS_TOTAL: &str = "liveness_evictions_total";
/// Broadcast drops total (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Dedup entries removed by the TTL prune task (counter).
pub const DEDUP_ENTRIES_EVICTED_TOTAL: &str = "dedup_entries_evicted_total";
/// Outbound agent dispatches (counter, labels: outcome).
pub const AGENT_DISPATCH_TOTAL: &str = "agent_dispatch_total";
