/*!
 * Logging setup for Verdant.
 *
 * Thin wrappers around `tracing-subscriber` so binaries and tests get the
 * same filter handling. `RUST_LOG` always wins over the configured level.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "verdant_devices=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_from_config(&LoggingConfig {
        level: filter.to_string(),
        ..LoggingConfig::default()
    })
}

/// Initialize the logging system from the logging section of the config
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log filter {}: {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_format {
        registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// Create a span that tags everything a device logs with its id and type
pub fn device_span(device_id: &str, device_type: &str) -> tracing::Span {
    tracing::info_span!("device", id = %device_id, device_type = %device_type)
}
