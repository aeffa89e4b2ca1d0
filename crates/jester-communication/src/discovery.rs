//! Device discovery and permission negotiation
//!
//! Discovery lists candidate devices, asks the OS for access, and opens
//! devices that are already accessible. Access requests resolve later as a
//! [`DeviceEvent::PermissionResult`] delivered to the event router.

use crate::transport::Transport;
use jester_core::Result;
use std::hash::{Hash, Hasher};

/// Identifier and descriptor of a discoverable serial device
///
/// Two handles are the same device when their system paths match.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    /// System path (e.g., "/dev/ttyACM0", "COM3")
    pub path: String,
    /// USB vendor ID if applicable
    pub vendor_id: Option<u16>,
    /// USB product ID if applicable
    pub product_id: Option<u16>,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// Product name if available
    pub product: Option<String>,
    /// Serial number if available
    pub serial_number: Option<String>,
}

impl DeviceHandle {
    /// Create a handle with only a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            vendor_id: None,
            product_id: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set product name
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for DeviceHandle {}

impl Hash for DeviceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.vendor_id, self.product_id) {
            (Some(vid), Some(pid)) => write!(f, "{} ({:04x}:{:04x})", self.path, vid, pid),
            _ => write!(f, "{}", self.path),
        }
    }
}

/// Outcome of an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    /// The OS allows opening the device
    Granted,
    /// The OS or the user refused
    Denied,
}

/// Lifecycle and hardware events fed to the event router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Host came to the foreground
    Resumed,
    /// Host went to the background
    Paused,
    /// A device appeared
    Attached(DeviceHandle),
    /// A device went away
    Detached(DeviceHandle),
    /// An access request resolved
    PermissionResult {
        /// Device the request was for
        device: DeviceHandle,
        /// Whether access was granted
        result: AccessResult,
    },
    /// Host is shutting down
    Destroyed,
}

impl std::fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Resumed => write!(f, "Resumed"),
            DeviceEvent::Paused => write!(f, "Paused"),
            DeviceEvent::Attached(device) => write!(f, "Attached {}", device),
            DeviceEvent::Detached(device) => write!(f, "Detached {}", device),
            DeviceEvent::PermissionResult { device, result } => {
                write!(f, "Permission {:?} for {}", result, device)
            }
            DeviceEvent::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// Source of devices and transports
pub trait DeviceDiscovery: Send + Sync {
    /// List candidate devices in a stable order. An empty list is not an error.
    fn enumerate(&self) -> Result<Vec<DeviceHandle>>;

    /// Ask for access. Returns once the request is issued; the answer
    /// arrives later as a [`DeviceEvent::PermissionResult`].
    fn request_access(&self, device: &DeviceHandle) -> Result<()>;

    /// Open a device without prompting.
    ///
    /// Fails with `NoPermission` when access has not been granted.
    fn try_open(&self, device: &DeviceHandle) -> Result<Box<dyn Transport>>;
}
