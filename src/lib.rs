//! # Jester
//!
//! USB-serial session manager for the Jester wireless accessory.
//!
//! ## Architecture
//!
//! Jester is organized as a workspace with multiple crates:
//!
//! 1. **jester-core** - Errors, line protocol codec, observable session state, events
//! 2. **jester-communication** - Serial transport, discovery, session, event router, hot-plug
//! 3. **jester-settings** - Configuration and persistence
//! 4. **jester** - Logging setup and the host binary
//!
//! A host feeds [`DeviceEvent`]s (resume, pause, attach, detach, permission
//! results, destroy) into an [`EventRouter`], which drives a single
//! [`Session`]. Collaborators read the session's state and call
//! [`Session::send`] with mode commands such as `mode:ble`.

pub use jester_core::{
    AlertListener, Command, ConnectionError, Error, EventDispatcher, InboundMessage, LineParams,
    ListenerHandle, LogEntry, Mode, ProtocolError, Result, SerialParity, SessionEvent,
    SessionListener, SessionSnapshot, SessionState,
};

pub use jester_communication::{
    list_ports, AccessResult, ConnectOutcome, DeviceDiscovery, DeviceEvent, DeviceHandle,
    EventRouter, HotplugMonitor, LineFramer, PortFilter, SerialDiscovery, SerialTransport,
    Session, SessionConfig, SessionPhase, Transport,
};

pub use jester_settings::{Config, DiscoverySettings, LoggingSettings, SessionSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Session tunables from the loaded configuration
pub fn session_config(settings: &SessionSettings) -> SessionConfig {
    SessionConfig {
        read_timeout: settings.read_timeout(),
        write_timeout: settings.write_timeout(),
        read_buffer_size: settings.read_buffer_size,
        log_capacity: settings.log_capacity,
        ..SessionConfig::default()
    }
}

/// Port filter from the loaded configuration
pub fn port_filter(settings: &DiscoverySettings) -> PortFilter {
    PortFilter {
        usb_names_only: settings.filter_ports,
        vendor_id: settings.vendor_id,
        product_id: settings.product_id,
    }
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, falling back to the configured level
/// - Console output, pretty or JSON lines
/// - Thread names, so reader-thread output is easy to pick out
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)?,
    };

    // Logs go to stderr; stdout belongs to the console protocol.
    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_config_from_settings() {
        let settings = SessionSettings {
            read_timeout_ms: 250,
            write_timeout_ms: 500,
            read_buffer_size: 64,
            log_capacity: 0,
        };
        let config = session_config(&settings);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(config.log_capacity, 0);
        assert_eq!(config.line_params, LineParams::ACCESSORY);
    }

    #[test]
    fn test_port_filter_from_settings() {
        let settings = DiscoverySettings {
            filter_ports: false,
            vendor_id: Some(0x2341),
            product_id: None,
            poll_interval_ms: 500,
        };
        let filter = port_filter(&settings);
        assert!(!filter.usb_names_only);
        assert_eq!(filter.vendor_id, Some(0x2341));
        assert_eq!(filter.product_id, None);
    }
}
