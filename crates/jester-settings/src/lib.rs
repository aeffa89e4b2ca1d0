//! Jester Settings Crate
//!
//! Handles application configuration and its persistence.

pub mod config;
pub mod error;

pub use config::{Config, DiscoverySettings, LoggingSettings, SessionSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
