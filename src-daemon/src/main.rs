//! Upload queue daemon.
//!
//! Usage: `upqueue-daemon [config.json]`. Without an argument the path is
//! taken from `UPQUEUE_CONFIG`; without either, defaults are used.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use upqueue::config::loader::validate_config;
use upqueue::{
    load_config, Config, Database, HttpUploader, LocalFileSource, LogNotifier, QueueEngine,
    RecoverySweeper, SqliteJobStore, SqliteStatsStore, UpqueueError,
};

const CONFIG_ENV_VAR: &str = "UPQUEUE_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
}

fn load() -> Result<Config, UpqueueError> {
    match config_path() {
        Some(path) => Ok(load_config(path)?),
        None => {
            let config = Config::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("Daemon failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), UpqueueError> {
    let db_path = config.resolved_database_path().ok_or_else(|| {
        upqueue::ConfigError::Validation {
            message: "could not determine database path (no home directory)".to_string(),
        }
    })?;
    let spool = config.uploader.resolved_spool_directory().ok_or_else(|| {
        upqueue::ConfigError::Validation {
            message: "could not determine spool directory (no home directory)".to_string(),
        }
    })?;

    let db = Database::open(&db_path)?;
    let jobs = Arc::new(SqliteJobStore::new(db.clone(), config.queue.max_attempts));
    let stats = Arc::new(SqliteStatsStore::new(db));

    let uploader = HttpUploader::new(
        config.uploader.http_config()?,
        Arc::new(LocalFileSource::new(spool)),
    )?;

    let engine = Arc::new(QueueEngine::new(
        jobs.clone(),
        stats,
        Arc::new(uploader),
        Arc::new(LogNotifier),
        config.engine_config(),
    ));

    // Jobs left in processing by a previous run are recovered before claiming starts.
    match engine.cleanup_stale().await {
        Ok(0) => {}
        Ok(n) => info!(reclaimed = n, "Recovered stale jobs from previous run"),
        Err(e) => warn!("Startup stale-job recovery failed: {}", e),
    }

    let sweeper = RecoverySweeper::new(
        jobs,
        config.sweeper.interval(),
        config.sweeper.stale_after(),
    );
    let (_sweep_trigger, sweep_rx) = broadcast::channel(4);
    let sweeper_handle = sweeper.start(sweep_rx);

    let engine_handle = engine.start();
    info!(
        database = %db_path.display(),
        max_concurrent = config.queue.max_concurrent_uploads,
        "Upload queue daemon running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, waiting for in-flight uploads");

    engine.stop();
    sweeper.stop();

    if let Some(handle) = engine_handle {
        if let Err(e) = handle.await {
            error!("Engine task ended abnormally: {}", e);
        }
    }
    if let Err(e) = sweeper_handle.await {
        error!("Sweeper task ended abnormally: {}", e);
    }

    info!("Upload queue daemon stopped");
    Ok(())
}
