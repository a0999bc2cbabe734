use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let queue = &config.queue;
    if queue.max_concurrent_uploads == 0 {
        return Err(invalid("queue.max_concurrent_uploads must be at least 1"));
    }
    if queue.max_attempts == 0 {
        return Err(invalid("queue.max_attempts must be at least 1"));
    }
    for (name, value) in [
        ("queue.idle_poll_ms", queue.idle_poll_ms),
        ("queue.backpressure_poll_ms", queue.backpressure_poll_ms),
        ("queue.store_error_backoff_ms", queue.store_error_backoff_ms),
        ("sweeper.interval_secs", config.sweeper.interval_secs),
        ("sweeper.stale_after_secs", config.sweeper.stale_after_secs),
        ("uploader.connect_timeout_secs", config.uploader.connect_timeout_secs),
        ("uploader.request_timeout_secs", config.uploader.request_timeout_secs),
    ] {
        if value == 0 {
            return Err(invalid(format!("{} must be greater than 0", name)));
        }
    }

    let base = config.uploader.upload_base.as_str();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(invalid(format!(
            "uploader.upload_base must be an http(s) URL, got '{}'",
            base
        )));
    }

    Ok(())
}
