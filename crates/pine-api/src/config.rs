//! Configuration loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PineConfig::default()`]
//! 2. If `~/.pine/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or does not match the schema.
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// REST API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the Pine backend.
    pub base_url: String,
    /// Bearer token, when already known.
    pub token: Option<String>,
    /// Per-request HTTP timeout, seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: crate::http::DEFAULT_BASE_URL.to_owned(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Streaming-engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Turn idle timeout, seconds.
    pub idle_timeout_secs: u64,
    /// Correlated-request timeout, seconds.
    pub request_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 120,
            request_timeout_secs: 10,
        }
    }
}

/// Top-level Pine client configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PineConfig {
    /// REST API settings.
    pub api: ApiConfig,
    /// Streaming-engine settings.
    pub stream: StreamConfig,
}

/// Resolve the path to the settings file (`~/.pine/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".pine").join("settings.json")
}

/// Load configuration from the default path with env var overrides.
pub fn load_config() -> Result<PineConfig, ConfigError> {
    load_config_from_path(&settings_path())
}

/// Load configuration from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_config_from_path(path: &Path) -> Result<PineConfig, ConfigError> {
    let defaults = serde_json::to_value(PineConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut config: PineConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded configuration.
///
/// Integers must be valid and within range; invalid values are silently
/// ignored (fall back to file/default).
pub fn apply_env_overrides(config: &mut PineConfig) {
    if let Some(v) = read_env_string("PINE_BASE_URL") {
        config.api.base_url = v;
    }
    if let Some(v) = read_env_string("PINE_TOKEN") {
        config.api.token = Some(v);
    }
    if let Some(v) = read_env_u64("PINE_HTTP_TIMEOUT_SECS", 1, 600) {
        config.api.timeout_secs = v;
    }
    if let Some(v) = read_env_u64("PINE_IDLE_TIMEOUT_SECS", 10, 3600) {
        config.stream.idle_timeout_secs = v;
    }
    if let Some(v) = read_env_u64("PINE_REQUEST_TIMEOUT_SECS", 1, 600) {
        config.stream.request_timeout_secs = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
