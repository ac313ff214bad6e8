//! # callguard
//!
//! Fraud alert relay binary: loads settings, installs telemetry, and runs
//! the webhook + WebSocket server until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use callguard_server::AlertServer;
use callguard_settings::{CallguardSettings, load_settings, load_settings_from_path};
use callguard_telemetry::{TelemetryConfig, init_telemetry};
use clap::Parser;

/// Grace period for in-flight work after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Real-time fraud alert relay.
#[derive(Parser, Debug)]
#[command(name = "callguard", about = "Real-time fraud alert relay for voice-agent webhooks")]
struct Cli {
    /// Settings file (defaults to `$CALLGUARD_SETTINGS` or `./callguard.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind; overrides settings and `PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Host to bind; overrides settings and `HOST`.
    #[arg(long)]
    host: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load(&self) -> Result<CallguardSettings> {
        let mut settings = match &self.config {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings().context("Failed to load settings")?,
        };
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if self.log_json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn telemetry_config(settings: &CallguardSettings) -> TelemetryConfig {
    TelemetryConfig {
        log_level: settings.logging.level.clone(),
        json: settings.logging.json,
        ..TelemetryConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load()?;

    let telemetry =
        init_telemetry(&telemetry_config(&settings)).context("Failed to initialize telemetry")?;

    let mut server = AlertServer::from_settings(&settings).context("Failed to build server")?;
    if let Some(handle) = telemetry.metrics_handle() {
        server = server.with_metrics(handle);
    }

    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!("callguard ready on port {}", handle.port());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = handle.shutdown(Some(SHUTDOWN_TIMEOUT)).await;
    tracing::info!(
        listeners_closed = report.listeners_closed,
        tasks_aborted = report.tasks_aborted.len(),
        "Shutdown complete"
    );
    Ok(())
}
