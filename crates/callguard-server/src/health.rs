//! `/health` endpoint.

use std::time::Instant;

use callguard_core::events::now_millis;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Currently registered listeners.
    pub active_connections: usize,
    /// Calls currently marked as alerted.
    pub alerted_calls: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Wall clock, epoch milliseconds (same clock as alert events).
    pub timestamp: i64,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    active_connections: usize,
    alerted_calls: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        active_connections,
        alerted_calls,
        uptime_secs: start_time.elapsed().as_secs(),
        timestamp: now_millis(),
    }
}
