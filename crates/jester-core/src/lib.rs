//! # Jester Core
//!
//! Core types shared by the Jester session manager:
//! the error taxonomy, the line protocol spoken with the accessory,
//! fixed serial line parameters, and the observable session state with
//! its event distribution.

pub mod error;
pub mod event;
pub mod params;
pub mod protocol;
pub mod state;

pub use error::{ConnectionError, Error, ProtocolError, Result};
pub use event::{AlertListener, EventDispatcher, ListenerHandle, SessionEvent, SessionListener};
pub use params::{LineParams, SerialParity};
pub use protocol::{Command, InboundMessage, Mode};
pub use state::{LogEntry, SessionSnapshot, SessionState, DEFAULT_LOG_CAPACITY};
