//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CallguardSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CallguardSettings;

/// Environment variable naming an alternative settings file.
pub const SETTINGS_PATH_ENV: &str = "CALLGUARD_SETTINGS";

/// Resolve the settings file path: `$CALLGUARD_SETTINGS`, else `./callguard.json`.
pub fn settings_path() -> PathBuf {
    std::env::var(SETTINGS_PATH_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map_or_else(|| PathBuf::from("callguard.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CallguardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CallguardSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn read_layered(path: &Path) -> Result<CallguardSettings> {
    let defaults = serde_json::to_value(CallguardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// `lookup` is `std::env::var` in production; tests pass a map. Invalid
/// values are logged and ignored, leaving the file/default value in place.
pub fn apply_env_overrides<F>(settings: &mut CallguardSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("PUBLIC_BASE_URL") {
        settings.server.public_base_url = Some(v);
    }
    if let Some(v) = read("SWEEP_INTERVAL_MS") {
        match parse_u64_range(&v, 100, 3_600_000) {
            Some(ms) => settings.server.sweep_interval_ms = ms,
            None => warn!(key = "SWEEP_INTERVAL_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("DEDUP_TTL_SECS") {
        match parse_u64_range(&v, 1, 7 * 24 * 60 * 60) {
            Some(secs) => settings.server.dedup_ttl_secs = secs,
            None => warn!(key = "DEDUP_TTL_SECS", value = %v, "invalid u64 env var, ignoring"),
        }
    }

    // ── Detection ───────────────────────────────────────────────────
    if let Some(v) = read("FRAUD_KEYWORDS") {
        let keywords = parse_keyword_list(&v);
        if keywords.is_empty() {
            warn!(key = "FRAUD_KEYWORDS", "empty keyword list env var, ignoring");
        } else {
            settings.detection.keywords = keywords;
        }
    }
    if let Some(v) = read("HONEYPOT_FUNCTION") {
        settings.detection.honeypot_function = v;
    }

    // ── Agent dispatch ──────────────────────────────────────────────
    if let Some(v) = read("VAPI_API_KEY") {
        settings.agent.api_key = Some(v);
    }
    if let Some(v) = read("ASSISTANT_ID") {
        settings.agent.assistant_id = Some(v);
    }
    if let Some(v) = read("VAPI_BASE_URL") {
        settings.agent.base_url = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("LOG_FORMAT") {
        match v.to_lowercase().as_str() {
            "json" => settings.logging.json = true,
            "pretty" | "text" => settings.logging.json = false,
            _ => warn!(key = "LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Split a comma-separated keyword list, trimming and dropping blanks.
pub fn parse_keyword_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
