//! # Jester Communication
//!
//! Serial device session management for Jester.
//! Owns the transport to a USB-serial accessory, discovers devices and
//! negotiates access, runs the background read loop, and routes host
//! lifecycle events to the session.

pub mod discovery;
pub mod framing;
pub mod hotplug;
pub mod router;
pub mod serial;
pub mod session;
pub mod transport;

pub use discovery::{AccessResult, DeviceDiscovery, DeviceEvent, DeviceHandle};
pub use framing::LineFramer;
pub use hotplug::HotplugMonitor;
pub use router::EventRouter;
pub use serial::{is_usb_serial_port, list_ports, PortFilter, SerialDiscovery};
pub use session::{
    ConnectOutcome, Session, SessionConfig, SessionPhase, ALERT_INVALID_COMMAND,
    ALERT_PORT_UNAVAILABLE, ALERT_SERIAL_ERROR,
};
pub use transport::{SerialTransport, Transport};
