//! Line protocol spoken with the accessory
//!
//! Every message is one ASCII line terminated by `\n`:
//! - outbound `mode:<name>` switches the current mode
//! - outbound `default:<name>` stores the mode used at power-up
//! - inbound `default:<name>` reports the stored power-up mode
//!
//! Any other inbound line is opaque text for the log.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MODE_PREFIX: &str = "mode:";
const DEFAULT_PREFIX: &str = "default:";

/// Operating mode of the accessory radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Radio off
    Off,
    /// Classic Bluetooth only
    Bluetooth,
    /// Bluetooth Low Energy only
    Ble,
    /// Classic and Low Energy together
    Both,
}

impl Mode {
    /// All modes in menu order
    pub const ALL: [Mode; 4] = [Mode::Off, Mode::Bluetooth, Mode::Ble, Mode::Both];

    /// Name used on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Bluetooth => "bluetooth",
            Mode::Ble => "ble",
            Mode::Both => "both",
        }
    }

    /// Name shown to the user
    pub fn label(self) -> &'static str {
        match self {
            Mode::Off => "Off",
            Mode::Bluetooth => "Bluetooth",
            Mode::Ble => "BLE",
            Mode::Both => "Both",
        }
    }

    /// Decode a mode reported by the device.
    ///
    /// Unknown names fall back to [`Mode::Off`] instead of failing.
    pub fn from_report(name: &str) -> Mode {
        name.parse().unwrap_or(Mode::Off)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    /// Case-insensitive; accepts wire names and labels alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|mode| mode.wire_name() == lowered)
            .ok_or_else(|| ProtocolError::UnknownMode {
                name: s.trim().to_string(),
            })
    }
}

/// Mode-change request sent to the accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch the running mode (`mode:<name>`)
    SetMode(Mode),
    /// Store the power-up mode (`default:<name>`)
    SetDefaultMode(Mode),
}

impl Command {
    /// Wire text without the line terminator
    pub fn to_line(&self) -> String {
        match self {
            Command::SetMode(mode) => format!("{}{}", MODE_PREFIX, mode.wire_name()),
            Command::SetDefaultMode(mode) => format!("{}{}", DEFAULT_PREFIX, mode.wire_name()),
        }
    }

    /// Bytes written to the transport, newline included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.push(b'\n');
        bytes
    }

    /// Parse collaborator text such as `mode:BLE` or `default:both`
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let trimmed = text.trim();
        let invalid = || ProtocolError::InvalidCommand {
            command: trimmed.to_string(),
        };

        let (prefix, name) = trimmed.split_once(':').ok_or_else(invalid)?;
        let mode: Mode = name.parse().map_err(|_| invalid())?;

        match prefix.to_ascii_lowercase().as_str() {
            "mode" => Ok(Command::SetMode(mode)),
            "default" => Ok(Command::SetDefaultMode(mode)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

/// A decoded line received from the accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `default:<name>` report, with the fallback already applied
    DefaultMode(Mode),
    /// Anything else, kept verbatim
    Text(String),
}

impl InboundMessage {
    /// Decode one line. Never fails: unknown content becomes [`InboundMessage::Text`].
    pub fn decode(line: &str) -> Self {
        let line = line.trim();
        match line.strip_prefix(DEFAULT_PREFIX) {
            Some(name) => InboundMessage::DefaultMode(Mode::from_report(name)),
            None => InboundMessage::Text(line.to_string()),
        }
    }
}
