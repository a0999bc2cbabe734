use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_RECENT_LIMIT};
use crate::secrets::{resolve_secret_optional, SecretError};
use crate::uploader::HttpUploaderConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Defaults to `~/.upqueue/data/upqueue.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub uploader: UploaderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            queue: QueueConfig::default(),
            sweeper: SweeperConfig::default(),
            uploader: UploaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent_uploads: self.queue.max_concurrent_uploads,
            idle_poll: Duration::from_millis(self.queue.idle_poll_ms),
            backpressure_poll: Duration::from_millis(self.queue.backpressure_poll_ms),
            dispatch_pacing: Duration::from_millis(self.queue.dispatch_pacing_ms),
            store_error_backoff: Duration::from_millis(self.queue.store_error_backoff_ms),
            stale_after: Duration::from_secs(self.sweeper.stale_after_secs),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    /// Attempt ceiling stamped on newly enqueued jobs.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default = "default_backpressure_poll_ms")]
    pub backpressure_poll_ms: u64,
    #[serde(default = "default_dispatch_pacing_ms")]
    pub dispatch_pacing_ms: u64,
    #[serde(default = "default_store_error_backoff_ms")]
    pub store_error_backoff_ms: u64,
}

fn default_max_concurrent_uploads() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_idle_poll_ms() -> u64 {
    5000
}

fn default_backpressure_poll_ms() -> u64 {
    1000
}

fn default_dispatch_pacing_ms() -> u64 {
    500
}

fn default_store_error_backoff_ms() -> u64 {
    5000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: default_max_concurrent_uploads(),
            max_attempts: default_max_attempts(),
            idle_poll_ms: default_idle_poll_ms(),
            backpressure_poll_ms: default_backpressure_poll_ms(),
            dispatch_pacing_ms: default_dispatch_pacing_ms(),
            store_error_backoff_ms: default_store_error_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_hour_secs")]
    pub interval_secs: u64,
    /// How long a job may sit in `processing` before it is presumed abandoned.
    #[serde(default = "default_hour_secs")]
    pub stale_after_secs: u64,
}

fn default_hour_secs() -> u64 {
    3600
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_hour_secs(),
            stale_after_secs: default_hour_secs(),
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// API key, resolved in order: direct value, file, environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    /// Directory holding one file per source reference. Defaults to `~/.upqueue/spool`.
    #[serde(default)]
    pub spool_directory: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_upload_base() -> String {
    "https://w.buzzheavier.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            upload_base: default_upload_base(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: None,
            spool_directory: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UploaderConfig {
    pub fn resolved_spool_directory(&self) -> Option<PathBuf> {
        self.spool_directory
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".upqueue").join("spool")))
    }

    /// Builds the HTTP client settings, resolving the API key.
    pub fn http_config(&self) -> Result<HttpUploaderConfig, SecretError> {
        let api_key = resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env_var.as_deref(),
        )?;

        Ok(HttpUploaderConfig {
            upload_base: self.upload_base.clone(),
            api_key,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
