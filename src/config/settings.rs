use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use super::defaults;

/// Top-level configuration for the riskgate scoring service.
/// Deserializes from a TOML configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "defaults::default_server_config")]
    pub server: ServerConfig,

    #[serde(default = "defaults::default_datasets_config")]
    pub datasets: DatasetsConfig,

    #[serde(default = "defaults::default_scoring_config")]
    pub scoring: ScoringConfig,

    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,

    #[serde(default = "defaults::default_storage_config")]
    pub storage: StorageConfig,

    #[serde(default = "defaults::default_tiers")]
    pub tiers: Vec<TierConfig>,

    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Settings {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: defaults::default_server_config(),
            datasets: defaults::default_datasets_config(),
            scoring: defaults::default_scoring_config(),
            logging: defaults::default_logging_config(),
            storage: defaults::default_storage_config(),
            tiers: defaults::default_tiers(),
            api_keys: Vec::new(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::default_bind")]
    pub bind: String,
}

/// Locations of the reference datasets used by the IP classifiers.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsConfig {
    #[serde(default = "defaults::default_vpn_path")]
    pub vpn_path: String,

    #[serde(default = "defaults::default_tor_path")]
    pub tor_path: String,

    #[serde(default = "defaults::default_datacenter_path")]
    pub datacenter_path: String,

    /// Load every dataset at startup instead of on the first lookup.
    #[serde(default = "defaults::default_preload")]
    pub preload: bool,

    /// Drop the cached datasets every this many seconds so refreshed files
    /// are picked up on the next lookup. 0 disables the refresh.
    #[serde(default = "defaults::default_refresh_secs")]
    pub refresh_secs: u64,
}

/// Tunable risk contributions. Tor and VPN weights are fixed and not
/// configurable.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "defaults::default_datacenter_score")]
    pub datacenter_score: f64,

    #[serde(default = "defaults::default_timezone_mismatch_score")]
    pub timezone_mismatch_score: f64,

    /// Multiplier applied to the [0,1] bot score before it is added.
    #[serde(default = "defaults::default_bot_score_scale")]
    pub bot_score_scale: f64,

    /// Bot score at or above which an event is recorded as `is_bot`.
    #[serde(default = "defaults::default_bot_threshold")]
    pub bot_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    pub level: String,

    #[serde(default = "defaults::default_log_directory")]
    pub directory: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "defaults::default_sqlite_path")]
    pub sqlite_path: String,
}

/// Where visitors, usage counters and API keys live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// Process-local maps; everything is lost on restart.
    Memory,
}

/// Monthly request ceiling for a subscription tier.
#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub monthly_limit: u64,
}

/// API key provisioned from the config file. Only the SHA-256 of `key`
/// is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub account_id: String,
    #[serde(default = "defaults::default_api_key_tier")]
    pub tier: String,
}
