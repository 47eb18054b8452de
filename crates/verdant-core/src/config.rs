/*!
 * Configuration management for Verdant.
 *
 * Configuration is layered: built-in defaults, then an optional file, then
 * environment variables (`VERDANT__SECTION__KEY`).
 */
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for Verdant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound event rate limits
    #[serde(default)]
    pub limits: EventLimitConfig,

    /// Devices to create at startup
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or a full directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_with_target")]
    pub with_target: bool,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Minimum intervals between two outbound events of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLimitConfig {
    /// State changes (mode, range value) in milliseconds
    #[serde(default = "default_state_limit_ms")]
    pub state_ms: u64,

    /// Sensor values and notifications in milliseconds
    #[serde(default = "default_sensor_value_limit_ms")]
    pub sensor_value_ms: u64,
}

/// A device declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Identifier assigned by the cloud platform
    pub id: String,

    /// Device type tag, e.g. `CapacitiveSoilMoistureSensor`
    pub device_type: String,

    /// Optional human readable name
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_with_target(),
            json_format: false,
        }
    }
}

impl Default for EventLimitConfig {
    fn default() -> Self {
        Self {
            state_ms: default_state_limit_ms(),
            sensor_value_ms: default_sensor_value_limit_ms(),
        }
    }
}

impl EventLimitConfig {
    /// State event interval as a duration
    pub fn state(&self) -> Duration {
        Duration::from_millis(self.state_ms)
    }

    /// Sensor value event interval as a duration
    pub fn sensor_value(&self) -> Duration {
        Duration::from_millis(self.sensor_value_ms)
    }
}

fn default_app_name() -> String {
    "verdant".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

fn default_state_limit_ms() -> u64 {
    1_000
}

fn default_sensor_value_limit_ms() -> u64 {
    60_000
}

impl Config {
    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(Error::config("device id must not be empty"));
            }
            if device.device_type.trim().is_empty() {
                return Err(Error::config(format!(
                    "device {} has no device_type",
                    device.id
                )));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(Error::config(format!("duplicate device id {}", device.id)));
            }
        }
        Ok(())
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let defaults = ConfigLib::try_from(&Config::default())
            .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?;
        let mut builder = ConfigLib::builder().add_source(defaults);

        if let Some(config_file) = self.config_file {
            if Path::new(&config_file).exists() {
                debug!("Loading configuration from {}", config_file);
                builder = builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            builder = builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;
        info!(devices = config.devices.len(), "Configuration loaded");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
