//! Server configuration.

use std::time::Duration;

use callguard_core::FraudKeywordSet;
use callguard_core::keywords::DEFAULT_KEYWORDS;
use callguard_settings::CallguardSettings;
use serde::{Deserialize, Serialize};

use crate::processor::ProcessorRules;

/// Configuration for the alert server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Externally reachable base URL, used only for the startup banner.
    pub public_base_url: Option<String>,
    /// Liveness sweep period in milliseconds.
    pub sweep_interval_ms: u64,
    /// Per-listener outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Age after which a dedup entry is pruned.
    pub dedup_ttl_secs: u64,
    /// Dedup prune period.
    pub dedup_prune_interval_secs: u64,
    /// Fraud keywords.
    pub keywords: Vec<String>,
    /// Honeypot tool function name.
    pub honeypot_function: String,
    /// Call statuses that end a call.
    pub terminal_statuses: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            public_base_url: None,
            sweep_interval_ms: 20_000,
            send_queue_capacity: 256,
            dedup_ttl_secs: 6 * 60 * 60,
            dedup_prune_interval_secs: 300,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| (*k).to_owned()).collect(),
            honeypot_function: "log_scam_data".into(),
            terminal_statuses: vec!["ended".into()],
        }
    }
}

impl ServerConfig {
    /// Liveness sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Dedup entry lifetime.
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    /// Dedup prune period.
    pub fn dedup_prune_interval(&self) -> Duration {
        Duration::from_secs(self.dedup_prune_interval_secs.max(1))
    }

    /// Base URL for log output: `publicBaseUrl` if set, else the bound address.
    pub fn display_base_url(&self, port: u16) -> String {
        match &self.public_base_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_owned(),
            _ => format!("http://{}:{port}", self.host),
        }
    }

    /// Detection rules for the webhook processor.
    pub fn processor_rules(&self) -> ProcessorRules {
        ProcessorRules {
            keywords: FraudKeywordSet::new(&self.keywords),
            honeypot_function: self.honeypot_function.clone(),
            terminal_statuses: self.terminal_statuses.clone(),
        }
    }
}

impl From<&CallguardSettings> for ServerConfig {
    fn from(settings: &CallguardSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            public_base_url: settings.server.public_base_url.clone(),
            sweep_interval_ms: settings.server.sweep_interval_ms,
            send_queue_capacity: settings.server.send_queue_capacity,
            dedup_ttl_secs: settings.server.dedup_ttl_secs,
            dedup_prune_interval_secs: settings.server.dedup_prune_interval_secs,
            keywords: settings.detection.keywords.clone(),
            honeypot_function: settings.detection.honeypot_function.clone(),
            terminal_statuses: settings.detection.terminal_statuses.clone(),
        }
    }
}
