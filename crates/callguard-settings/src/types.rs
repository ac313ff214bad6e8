//! Settings types.
//!
//! All structs use `camelCase` keys and `#[serde(default)]`, so a settings
//! file only needs the keys it overrides.

use callguard_core::keywords::DEFAULT_KEYWORDS;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallguardSettings {
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Fraud heuristic settings.
    pub detection: DetectionSettings,
    /// Outbound agent-dispatch API settings.
    pub agent: AgentSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl CallguardSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.sweep_interval_ms == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "server.sweepIntervalMs must be positive".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".into(),
            ));
        }
        if self.detection.honeypot_function.trim().is_empty() {
            return Err(crate::SettingsError::InvalidValue(
                "detection.honeypotFunction must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port (`0` = auto-assign).
    pub port: u16,
    /// Public base URL, used only for the startup banner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Liveness sweep period in milliseconds.
    pub sweep_interval_ms: u64,
    /// Per-listener outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Age after which a dedup entry is evicted even without an end-of-call status.
    pub dedup_ttl_secs: u64,
    /// How often the dedup eviction runs.
    pub dedup_prune_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
            sweep_interval_ms: 20_000,
            send_queue_capacity: 256,
            dedup_ttl_secs: 6 * 60 * 60,
            dedup_prune_interval_secs: 300,
        }
    }
}

/// Fraud heuristic settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionSettings {
    /// Indicators matched case-insensitively as substrings.
    pub keywords: Vec<String>,
    /// Function name the voice agent calls to log captured scam data.
    pub honeypot_function: String,
    /// Call statuses that end a call and release its dedup entry.
    pub terminal_statuses: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(ToString::to_string).collect(),
            honeypot_function: "log_scam_data".to_string(),
            terminal_statuses: vec!["ended".to_string()],
        }
    }
}

/// Outbound agent-dispatch API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Bearer token for the dispatch API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Assistant that places the counter-call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl AgentSettings {
    /// Dispatch is enabled only when both credentials are present.
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.assistant_id.as_deref().is_some_and(|a| !a.is_empty())
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: None,
            base_url: "https://api.vapi.ai".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = CallguardSettings::default();
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.server.sweep_interval_ms, 20_000);
        assert_eq!(s.detection.keywords.len(), 22);
        assert_eq!(s.detection.honeypot_function, "log_scam_data");
        assert_eq!(s.detection.terminal_statuses, vec!["ended"]);
        assert_eq!(s.agent.base_url, "https://api.vapi.ai");
        assert!(!s.logging.json);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn agent_enabled_requires_both_credentials() {
        let mut agent = AgentSettings::default();
        assert!(!agent.is_enabled());
        agent.api_key = Some("key".into());
        assert!(!agent.is_enabled());
        agent.assistant_id = Some(String::new());
        assert!(!agent.is_enabled());
        agent.assistant_id = Some("asst".into());
        assert!(agent.is_enabled());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(CallguardSettings::default()).unwrap();
        assert!(json["server"].get("sweepIntervalMs").is_some());
        assert!(json["detection"].get("honeypotFunction").is_some());
        assert!(json["server"].get("publicBaseUrl").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: CallguardSettings =
            serde_json::from_str(r#"{"server":{"port":8080}}"#).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.detection.honeypot_function, "log_scam_data");
    }

    #[test]
    fn validate_rejects_zero_sweep() {
        let mut s = CallguardSettings::default();
        s.server.sweep_interval_ms = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_honeypot() {
        let mut s = CallguardSettings::default();
        s.detection.honeypot_function = "  ".into();
        assert!(s.validate().is_err());
    }
}
