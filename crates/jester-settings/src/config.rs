//! Configuration for Jester
//!
//! Supports JSON and TOML files; the default location is
//! `<platform config dir>/jester/config.toml`.
//!
//! Configuration is organized into sections:
//! - Session settings (timeouts, read buffer, log retention)
//! - Discovery settings (port filtering, hot-plug polling)
//! - Logging settings (level, output format)

use crate::error::{ConfigError, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the platform config dir
pub const APP_DIR_NAME: &str = "jester";
/// File name of the default config
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Serial session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Longest a single read blocks, in milliseconds
    pub read_timeout_ms: u64,
    /// Longest a single write blocks, in milliseconds
    pub write_timeout_ms: u64,
    /// Bytes requested per read
    pub read_buffer_size: usize,
    /// Log entries kept in memory; 0 keeps everything
    pub log_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            read_buffer_size: 1024,
            log_capacity: 1000,
        }
    }
}

impl SessionSettings {
    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write timeout as a `Duration`
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Device discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Only offer ports that look like USB serial adapters
    pub filter_ports: bool,
    /// Only offer devices with this USB vendor id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    /// Only offer devices with this USB product id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    /// Hot-plug scan interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            filter_ports: true,
            vendor_id: None,
            product_id: None,
            poll_interval_ms: 1000,
        }
    }
}

impl DiscoverySettings {
    /// Hot-plug scan interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level or filter directive, e.g. `info` or `jester_communication=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl LoggingSettings {
    /// Whether `level` is a plain level or a filter directive
    fn level_is_valid(&self) -> bool {
        let level = self.level.trim();
        if level.is_empty() {
            return false;
        }
        level.contains('=')
            || level.contains(',')
            || LEVELS.contains(&level.to_ascii_lowercase().as_str())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Session settings
    pub session: SessionSettings,
    /// Discovery settings
    pub discovery: DiscoverySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load_from_file(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.read_timeout_ms == 0 {
            return Err(out_of_range("session.read_timeout_ms", 0));
        }
        if self.session.write_timeout_ms == 0 {
            return Err(out_of_range("session.write_timeout_ms", 0));
        }
        if self.session.read_buffer_size == 0 {
            return Err(out_of_range("session.read_buffer_size", 0));
        }
        if self.discovery.poll_interval_ms == 0 {
            return Err(out_of_range("discovery.poll_interval_ms", 0));
        }
        if !self.logging.level_is_valid() {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }
        Ok(())
    }
}
