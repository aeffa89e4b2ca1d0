//! Transport layer
//!
//! A [`Transport`] is an open, duplex byte channel to one device. Reads and
//! writes block for at most the timeout passed with each call. Retries are
//! the caller's business.

use jester_core::{ConnectionError, Error, LineParams, Result, SerialParity};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Open byte channel to a device
pub trait Transport: Send + Sync {
    /// Device path, for log lines
    fn name(&self) -> String;

    /// Apply line parameters
    fn configure(&self, params: &LineParams) -> Result<()>;

    /// Read up to `buf.len()` bytes.
    ///
    /// Fails with [`ConnectionError::Timeout`] when nothing arrived in time;
    /// callers treat that as "no data yet", not as a broken link.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write all of `data` or fail
    fn write(&self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Release the device. Idempotent; never fails.
    fn close(&self);

    /// Whether `close` has not been called yet
    fn is_open(&self) -> bool;
}

fn timeout_ms(timeout: Duration) -> u64 {
    timeout.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Map an I/O failure during read/write onto the error taxonomy
fn map_io_error(e: io::Error, timeout: Duration) -> Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionError::Timeout {
            timeout_ms: timeout_ms(timeout),
        }
        .into(),
        _ => ConnectionError::io(e).into(),
    }
}

/// Map a `serialport` open failure onto the error taxonomy
pub(crate) fn map_open_error(device: &str, e: serialport::Error) -> Error {
    match e.kind() {
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            ConnectionError::NoPermission {
                device: device.to_string(),
            }
            .into()
        }
        serialport::ErrorKind::NoDevice
        | serialport::ErrorKind::Io(io::ErrorKind::ResourceBusy) => ConnectionError::DeviceBusy {
            device: device.to_string(),
        }
        .into(),
        _ => ConnectionError::io(format!("Failed to open port {}: {}", device, e)).into(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn to_serialport_data_bits(bits: u8) -> Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        _ => Err(ConnectionError::InvalidParameters {
            reason: format!("Invalid data bits: {}", bits),
        }
        .into()),
    }
}

fn to_serialport_stop_bits(bits: u8) -> Result<serialport::StopBits> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        _ => Err(ConnectionError::InvalidParameters {
            reason: format!("Invalid stop bits: {}", bits),
        }
        .into()),
    }
}

/// Serial port transport backed by the `serialport` crate.
///
/// Holds two handles to the same device so a foreground write never queues
/// behind a background read that is waiting out its timeout.
pub struct SerialTransport {
    name: String,
    reader: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
}

impl SerialTransport {
    /// Open a serial device without touching its line settings
    pub fn open(path: &str) -> Result<Self> {
        let params = LineParams::ACCESSORY;
        let port = serialport::new(path, params.baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", path, e);
                map_open_error(path, e)
            })?;

        let writer = port
            .try_clone()
            .map_err(|e| ConnectionError::io(format!("Failed to clone port {}: {}", path, e)))?;

        tracing::debug!("Opened serial port {}", path);
        Ok(Self {
            name: path.to_string(),
            reader: Mutex::new(Some(port)),
            writer: Mutex::new(Some(writer)),
        })
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn configure(&self, params: &LineParams) -> Result<()> {
        let data_bits = to_serialport_data_bits(params.data_bits)?;
        let stop_bits = to_serialport_stop_bits(params.stop_bits)?;

        let mut guard = self.reader.lock();
        let port = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        port.set_baud_rate(params.baud_rate)
            .and_then(|_| port.set_data_bits(data_bits))
            .and_then(|_| port.set_stop_bits(stop_bits))
            .and_then(|_| port.set_parity(to_serialport_parity(params.parity)))
            .and_then(|_| port.set_flow_control(serialport::FlowControl::None))
            .map_err(ConnectionError::io)?;

        tracing::debug!("Configured {} for {}", self.name, params);
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut guard = self.reader.lock();
        let port = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        port.set_timeout(timeout).map_err(ConnectionError::io)?;
        port.read(buf).map_err(|e| map_io_error(e, timeout))
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<()> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        port.set_timeout(timeout).map_err(ConnectionError::io)?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| map_io_error(e, timeout))
    }

    fn close(&self) {
        let writer = self.writer.lock().take();
        let reader = self.reader.lock().take();
        if writer.is_some() || reader.is_some() {
            tracing::debug!("Closed serial port {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}
