mod api;
mod config;
mod intel;
mod models;
mod scoring;
mod storage;
mod usage;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::auth::{api_key_id, hash_api_key};
use crate::api::routes::AppState;
use crate::api::server::ApiServer;
use crate::config::settings::{LoggingConfig, Settings, StorageBackend};
use crate::intel::datacenter::DatacenterClassifier;
use crate::intel::dataset::DatasetError;
use crate::intel::tor::TorClassifier;
use crate::intel::vpn::VpnClassifier;
use crate::scoring::pipeline::AnalysisPipeline;
use crate::storage::memory::MemoryStore;
use crate::storage::repository::{ApiKeyRepository, UsageRepository, VisitorRepository};
use crate::storage::sqlite::SqliteStore;
use crate::usage::tracker::UsageTracker;

/// Parse the `--config` CLI flag. Defaults to `config/riskgate.toml`.
fn parse_config_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = String::from("config/riskgate.toml");

    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" {
            if let Some(path) = args.get(i + 1) {
                config_path = path.clone();
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    config_path
}

/// Initialise the `tracing` subscriber with stdout and a daily-rolling file.
/// The returned guard flushes the file writer on drop.
fn init_tracing(logging: &LoggingConfig) -> WorkerGuard {
    let _ = std::fs::create_dir_all(&logging.directory);

    let file_appender = tracing_appender::rolling::daily(&logging.directory, "riskgate.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let (json_stdout, plain_stdout) = if logging.json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_stdout)
        .with(plain_stdout)
        .with(file_layer)
        .init();

    guard
}

struct Repositories {
    visitors: Arc<dyn VisitorRepository>,
    usage: Arc<dyn UsageRepository>,
    api_keys: Arc<dyn ApiKeyRepository>,
}

/// Open the configured store and seed tiers and API keys from the config.
fn open_storage(settings: &Settings) -> anyhow::Result<Repositories> {
    match settings.storage.backend {
        StorageBackend::Sqlite => {
            let path = &settings.storage.sqlite_path;
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }

            let store = Arc::new(
                SqliteStore::new(path)
                    .with_context(|| format!("Failed to open SQLite database: {}", path))?,
            );
            for tier in &settings.tiers {
                store.upsert_tier(&tier.name, tier.monthly_limit)?;
            }
            for key in &settings.api_keys {
                let hash = hash_api_key(&key.key);
                store.upsert_api_key(&api_key_id(&hash), &hash, &key.account_id, &key.tier)?;
            }
            info!(path = %path, "SQLite storage opened");

            Ok(Repositories {
                visitors: store.clone(),
                usage: store.clone(),
                api_keys: store,
            })
        }
        StorageBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            for tier in &settings.tiers {
                store.upsert_tier(&tier.name, tier.monthly_limit);
            }
            for key in &settings.api_keys {
                let hash = hash_api_key(&key.key);
                store.upsert_api_key(&api_key_id(&hash), &hash, &key.account_id, &key.tier);
            }
            warn!("In-memory storage selected; visitors and usage are lost on restart");

            Ok(Repositories {
                visitors: store.clone(),
                usage: store.clone(),
                api_keys: store,
            })
        }
    }
}

fn preload(name: &str, result: Result<usize, DatasetError>) {
    match result {
        Ok(count) => info!(dataset = name, entries = count, "Dataset preloaded"),
        Err(e) => warn!(dataset = name, error = %e, "Dataset preload failed; lookups will not match"),
    }
}

/// Reset the dataset caches on a fixed period so refreshed files are read on
/// the next lookup.
fn spawn_dataset_refresh(pipeline: Arc<AnalysisPipeline>, every: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        // The first tick completes immediately.
        tick.tick().await;
        loop {
            tick.tick().await;
            pipeline.reset_datasets();
            info!("Reference datasets reset; they reload on the next lookup");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---------------------------------------------------------------
    // 1. Configuration
    // ---------------------------------------------------------------
    let config_path = parse_config_path();
    let settings = Settings::load(&config_path)?;

    // ---------------------------------------------------------------
    // 2. Logging
    // ---------------------------------------------------------------
    let _log_guard = init_tracing(&settings.logging);

    info!("Starting riskgate visitor scoring service");
    info!("Config loaded from {}", config_path);

    // ---------------------------------------------------------------
    // 3. Storage
    // ---------------------------------------------------------------
    let repos = open_storage(&settings)?;
    info!(
        tiers = settings.tiers.len(),
        api_keys = settings.api_keys.len(),
        "Storage layer initialised"
    );

    // ---------------------------------------------------------------
    // 4. Reference datasets
    // ---------------------------------------------------------------
    let vpn = Arc::new(VpnClassifier::new(&settings.datasets.vpn_path));
    let tor = Arc::new(TorClassifier::new(&settings.datasets.tor_path));
    let datacenter = Arc::new(DatacenterClassifier::new(&settings.datasets.datacenter_path));

    if settings.datasets.preload {
        preload("vpn", vpn.reload());
        preload("tor", tor.reload());
        preload("datacenter", datacenter.reload());
    } else {
        info!("Datasets will load on first lookup");
    }

    // ---------------------------------------------------------------
    // 5. Scoring pipeline and quota tracker
    // ---------------------------------------------------------------
    let pipeline = Arc::new(AnalysisPipeline::new(
        vpn,
        tor,
        datacenter,
        repos.visitors,
        &settings.scoring,
    ));
    let usage = Arc::new(UsageTracker::new(repos.usage));

    if settings.datasets.refresh_secs > 0 {
        spawn_dataset_refresh(
            pipeline.clone(),
            Duration::from_secs(settings.datasets.refresh_secs),
        );
        info!(every_secs = settings.datasets.refresh_secs, "Dataset refresh scheduled");
    }

    // ---------------------------------------------------------------
    // 6. HTTP API
    // ---------------------------------------------------------------
    let state = AppState {
        pipeline,
        usage,
        api_keys: repos.api_keys,
        start_time: Instant::now(),
    };
    let server = ApiServer::new(state, settings.server.bind.clone());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("API server error: {}", e);
        }
    });

    info!("riskgate is running. Press Ctrl+C to shut down.");

    // ---------------------------------------------------------------
    // 7. Wait for shutdown signal
    // ---------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Shutting down riskgate...");

    server_handle.abort();

    info!("riskgate shut down");
    Ok(())
}
