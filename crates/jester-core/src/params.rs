//! Serial line parameters

use serde::{Deserialize, Serialize};

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Line settings applied to a freshly opened transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineParams {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
}

impl LineParams {
    /// The accessory speaks 115200 8N1 and nothing else
    pub const ACCESSORY: LineParams = LineParams {
        baud_rate: 115_200,
        data_bits: 8,
        stop_bits: 1,
        parity: SerialParity::None,
    };
}

impl Default for LineParams {
    fn default() -> Self {
        Self::ACCESSORY
    }
}

impl std::fmt::Display for LineParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parity = match self.parity {
            SerialParity::None => 'N',
            SerialParity::Even => 'E',
            SerialParity::Odd => 'O',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.data_bits, parity, self.stop_bits
        )
    }
}
