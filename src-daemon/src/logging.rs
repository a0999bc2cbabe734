use tracing_subscriber::{fmt, EnvFilter};
use upqueue::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    // The library logs through both `log` and `tracing`.
    tracing_log::LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        let subscriber = fmt().json().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = fmt().with_target(true).with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
