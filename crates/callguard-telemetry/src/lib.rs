//! # callguard-telemetry
//!
//! Process-wide observability setup: the `tracing` subscriber and the
//! Prometheus metrics recorder. Call [`init_telemetry`] once at startup.

#![deny(unsafe_code)]

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level filter (`info`, `debug`, ...). Overridden by `RUST_LOG`.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Whether to install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            json: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub fn filter_directive(&self) -> String {
        self.log_level.to_lowercase()
    }
}

/// Errors from telemetry initialization.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global `tracing` subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),
}

/// Handles kept alive for the process lifetime.
pub struct TelemetryGuard {
    metrics: Option<PrometheusHandle>,
}

impl TelemetryGuard {
    /// Handle used to render `/metrics`, if the recorder was installed.
    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics.clone()
    }
}

/// Initialize logging and metrics. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;

    let metrics = if config.metrics_enabled {
        let handle = PrometheusBuilder::new().install_recorder()?;
        tracing::info!("prometheus metrics recorder installed");
        Some(handle)
    } else {
        None
    };

    Ok(TelemetryGuard { metrics })
}
