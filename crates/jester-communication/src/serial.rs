//! Serial port discovery
//!
//! Enumerates USB-serial ports through the `serialport` crate and answers
//! access requests by probing the device node.
//!
//! Recognised port names:
//! - Windows: COM* (e.g., COM1, COM3)
//! - Linux: /dev/ttyUSB*, /dev/ttyACM*
//! - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*

use crate::discovery::{AccessResult, DeviceDiscovery, DeviceEvent, DeviceHandle};
use crate::transport::{SerialTransport, Transport};
use jester_core::{Error, Result};
use tokio::sync::mpsc::UnboundedSender;

/// Which enumerated ports count as candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    /// Keep only USB-serial style port names
    pub usb_names_only: bool,
    /// Keep only this USB vendor ID
    pub vendor_id: Option<u16>,
    /// Keep only this USB product ID
    pub product_id: Option<u16>,
}

impl PortFilter {
    /// Filter accepting USB-serial port names from any vendor
    pub fn usb_serial() -> Self {
        Self {
            usb_names_only: true,
            vendor_id: None,
            product_id: None,
        }
    }

    /// Whether a device passes the filter
    pub fn accepts(&self, device: &DeviceHandle) -> bool {
        if self.usb_names_only && !is_usb_serial_port(&device.path) {
            return false;
        }
        if self.vendor_id.is_some() && device.vendor_id != self.vendor_id {
            return false;
        }
        if self.product_id.is_some() && device.product_id != self.product_id {
            return false;
        }
        true
    }
}

/// List serial ports on the system as device handles, unfiltered
pub fn list_ports() -> Result<Vec<DeviceHandle>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports.iter().map(to_device_handle).collect())
}

fn to_device_handle(port: &serialport::SerialPortInfo) -> DeviceHandle {
    let handle = DeviceHandle::new(&port.port_name);

    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            let mut handle = handle.with_usb_ids(usb_info.vid, usb_info.pid);
            if let Some(ref mfg) = usb_info.manufacturer {
                handle = handle.with_manufacturer(mfg);
            }
            if let Some(ref product) = usb_info.product {
                handle = handle.with_product(product);
            }
            if let Some(ref serial) = usb_info.serial_number {
                handle = handle.with_serial_number(serial);
            }
            handle
        }
        _ => handle,
    }
}

/// Check if a port name looks like a USB-serial adapter
pub fn is_usb_serial_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

/// Probe whether the current process may open the device read/write
#[cfg(unix)]
pub fn probe_access(path: &str) -> AccessResult {
    match std::fs::OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => AccessResult::Granted,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => AccessResult::Denied,
        // Busy or vanished devices are reported by the open that follows.
        Err(_) => AccessResult::Granted,
    }
}

/// Probe whether the current process may open the device read/write
#[cfg(not(unix))]
pub fn probe_access(_path: &str) -> AccessResult {
    AccessResult::Granted
}

/// Discovery over the host's serial ports
pub struct SerialDiscovery {
    filter: PortFilter,
    events: UnboundedSender<DeviceEvent>,
}

impl SerialDiscovery {
    /// Create a discovery that reports access results on `events`
    pub fn new(filter: PortFilter, events: UnboundedSender<DeviceEvent>) -> Self {
        Self { filter, events }
    }

    /// Active port filter
    pub fn filter(&self) -> &PortFilter {
        &self.filter
    }
}

impl DeviceDiscovery for SerialDiscovery {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        let devices: Vec<DeviceHandle> = list_ports()?
            .into_iter()
            .filter(|device| self.filter.accepts(device))
            .collect();
        tracing::debug!("Enumerated {} serial device(s)", devices.len());
        Ok(devices)
    }

    fn request_access(&self, device: &DeviceHandle) -> Result<()> {
        let result = probe_access(&device.path);
        tracing::debug!("Access probe for {}: {:?}", device, result);
        self.events
            .send(DeviceEvent::PermissionResult {
                device: device.clone(),
                result,
            })
            .map_err(|_| Error::other("Device event channel is closed"))
    }

    fn try_open(&self, device: &DeviceHandle) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open(&device.path)?;
        Ok(Box::new(transport))
    }
}
