use super::settings::{
    DatasetsConfig, LoggingConfig, ScoringConfig, ServerConfig, StorageBackend, StorageConfig,
    TierConfig,
};

// ---------------------------------------------------------------------------
// Top-level struct defaults
// ---------------------------------------------------------------------------

pub fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
    }
}

pub fn default_datasets_config() -> DatasetsConfig {
    DatasetsConfig {
        vpn_path: default_vpn_path(),
        tor_path: default_tor_path(),
        datacenter_path: default_datacenter_path(),
        preload: default_preload(),
        refresh_secs: default_refresh_secs(),
    }
}

pub fn default_scoring_config() -> ScoringConfig {
    ScoringConfig {
        datacenter_score: default_datacenter_score(),
        timezone_mismatch_score: default_timezone_mismatch_score(),
        bot_score_scale: default_bot_score_scale(),
        bot_threshold: default_bot_threshold(),
    }
}

pub fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        directory: default_log_directory(),
        json: false,
    }
}

pub fn default_storage_config() -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::default(),
        sqlite_path: default_sqlite_path(),
    }
}

pub fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            name: "free".to_string(),
            monthly_limit: 1_000,
        },
        TierConfig {
            name: "pro".to_string(),
            monthly_limit: 100_000,
        },
        TierConfig {
            name: "business".to_string(),
            monthly_limit: 1_000_000,
        },
    ]
}

// ---------------------------------------------------------------------------
// Field defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn default_vpn_path() -> String {
    "data/vpn-ranges.txt".to_string()
}

pub fn default_tor_path() -> String {
    "data/tor-exit-nodes.txt".to_string()
}

pub fn default_datacenter_path() -> String {
    "data/datacenter-ranges.csv".to_string()
}

pub fn default_preload() -> bool {
    false
}

pub fn default_refresh_secs() -> u64 {
    3600
}

pub fn default_datacenter_score() -> f64 {
    15.0
}

pub fn default_timezone_mismatch_score() -> f64 {
    15.0
}

pub fn default_bot_score_scale() -> f64 {
    40.0
}

pub fn default_bot_threshold() -> f64 {
    0.5
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_directory() -> String {
    "logs".to_string()
}

pub fn default_sqlite_path() -> String {
    "data/riskgate.db".to_string()
}

pub fn default_api_key_tier() -> String {
    "free".to_string()
}
