//! Error handling for Jester
//!
//! Provides the error types shared by every layer of the session manager:
//! - Connection errors (discovery, permission, transport I/O)
//! - Protocol errors (mode names, command text)
//!
//! All error types use `thiserror`. None of them ever crosses into the
//! collaborator layer; the session converts them into log entries and alerts.

use thiserror::Error;

/// Connection error type
///
/// Represents failures while discovering, opening, configuring, reading from
/// or writing to a serial device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Enumeration returned no candidate devices
    #[error("No USB serial device found")]
    NoDeviceFound,

    /// The OS has not granted access to the device yet
    #[error("No permission to access {device}")]
    NoPermission {
        /// The device path.
        device: String,
    },

    /// The device is held by another process or was unplugged during open
    #[error("Device busy: {device}")]
    DeviceBusy {
        /// The device path.
        device: String,
    },

    /// A blocking read or write did not complete in time
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Read or write failure on an open transport
    #[error("I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },

    /// No transport is open
    #[error("Not connected")]
    NotConnected,

    /// Line parameters the device cannot accept
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

impl ConnectionError {
    /// Build an I/O error from anything printable
    pub fn io(reason: impl std::fmt::Display) -> Self {
        ConnectionError::Io {
            reason: reason.to_string(),
        }
    }
}

/// Protocol error type
///
/// Represents text that does not map onto the line protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Mode name outside off|bluetooth|ble|both
    #[error("Unknown mode: {name}")]
    UnknownMode {
        /// The unrecognized mode name.
        name: String,
    },

    /// Command text that is neither `mode:<name>` nor `default:<name>`
    #[error("Unrecognized command: {command}")]
    InvalidCommand {
        /// The rejected command text.
        command: String,
    },
}

/// Main error type for Jester
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    ///
    /// Timeouts are the normal idle result of a read and never end a session.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Connection(ConnectionError::Timeout { .. }) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Check if the device refused access
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Connection(ConnectionError::NoPermission { .. }) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
