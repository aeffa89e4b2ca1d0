//! Serial device session
//!
//! A [`Session`] owns at most one open [`Transport`] and the background
//! thread reading from it. The read thread runs only while the session is
//! `Connected`; every teardown path stops it and waits for it before the
//! transport is closed or a new device is opened.
//!
//! Failures never reach the caller as errors. They become log entries on the
//! [`SessionState`], plus an alert for actions the user started.

use crate::discovery::{AccessResult, DeviceDiscovery, DeviceHandle};
use crate::framing::LineFramer;
use crate::transport::Transport;
use jester_core::{
    AlertListener, Command, EventDispatcher, InboundMessage, LineParams, ListenerHandle, Result,
    SessionEvent, SessionListener, SessionSnapshot, SessionState, DEFAULT_LOG_CAPACITY,
};
use jester_core::{Error, Mode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;

/// Alert title when no port is open
pub const ALERT_PORT_UNAVAILABLE: &str = "Serial Port Unavailable";
/// Alert title when a write fails
pub const ALERT_SERIAL_ERROR: &str = "Serial Error";
/// Alert title when command text cannot be parsed
pub const ALERT_INVALID_COMMAND: &str = "Invalid Command";

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest a single read blocks
    pub read_timeout: Duration,
    /// Longest a single write blocks
    pub write_timeout: Duration,
    /// Bytes requested per read
    pub read_buffer_size: usize,
    /// Log entries retained; 0 keeps everything
    pub log_capacity: usize,
    /// Line settings applied after open
    pub line_params: LineParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(1000),
            read_buffer_size: 1024,
            log_capacity: DEFAULT_LOG_CAPACITY,
            line_params: LineParams::ACCESSORY,
        }
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No device
    Idle,
    /// Waiting for the OS to answer an access request
    AwaitingPermission,
    /// Opening and configuring the transport
    Connecting,
    /// Transport open, read thread running
    Connected,
    /// Closing the transport
    Disconnecting,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::AwaitingPermission => write!(f, "AwaitingPermission"),
            SessionPhase::Connecting => write!(f, "Connecting"),
            SessionPhase::Connected => write!(f, "Connected"),
            SessionPhase::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Result of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Transport open and read thread started
    Connected,
    /// This device was already connecting or connected
    AlreadyConnected,
    /// Another device holds the session
    Busy,
    /// Access was requested; the answer comes later
    AwaitingPermission,
    /// Access was refused
    Denied,
    /// Open, configure or the access request failed
    Failed,
}

/// Phase, device and transport, guarded together.
///
/// Writes happen while this lock is held, so a write never races a close.
struct Link {
    phase: SessionPhase,
    device: Option<DeviceHandle>,
    transport: Option<Arc<dyn Transport>>,
    /// Bumped on every successful connect; a read thread only tears down the
    /// link it was started for.
    generation: u64,
}

impl Link {
    fn idle() -> Self {
        Self {
            phase: SessionPhase::Idle,
            device: None,
            transport: None,
            generation: 0,
        }
    }
}

/// State shared between the session and its read thread
struct Shared {
    link: Mutex<Link>,
    state: Arc<SessionState>,
}

impl Shared {
    /// Move to `Idle`, closing the transport if one is open.
    ///
    /// With `generation` set, does nothing unless that link is still current.
    /// Returns true when a transition happened.
    fn teardown(&self, generation: Option<u64>, reason: &str) -> bool {
        let (transport, device) = {
            let mut link = self.link.lock();
            if generation.is_some_and(|g| g != link.generation) {
                return false;
            }
            if link.phase == SessionPhase::Idle && link.transport.is_none() {
                return false;
            }
            link.phase = SessionPhase::Disconnecting;
            (link.transport.take(), link.device.clone())
        };

        match transport {
            Some(transport) => {
                transport.close();
                tracing::info!("{}", reason);
                self.state.set_connected(false, reason);
            }
            None => {
                if let Some(device) = &device {
                    tracing::info!("Cancelled pending connection to {}", device);
                    self.state
                        .append_log(format!("Cancelled pending connection to {}", device.path));
                }
            }
        }

        // A request_access may have claimed the link while it was unlocked.
        let mut link = self.link.lock();
        if link.phase == SessionPhase::Disconnecting
            && generation.is_none_or(|g| g == link.generation)
        {
            link.phase = SessionPhase::Idle;
            link.device = None;
        }
        true
    }
}

/// Handle on a running read thread
struct ReadLoop {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ReadLoop {
    /// Signal the thread and wait for it to finish
    fn stop(self) {
        self.cancel.store(true, Ordering::Release);
        if self.handle.thread().id() == std::thread::current().id() {
            // Called from a listener on the read thread; it exits on its own.
            return;
        }
        if self.handle.join().is_err() {
            tracing::error!("Serial read thread panicked");
        }
    }
}

/// Everything the read thread needs
struct ReadContext {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    cancel: Arc<AtomicBool>,
    generation: u64,
    timeout: Duration,
    buffer_size: usize,
}

impl ReadContext {
    fn run(self) {
        let mut buffer = vec![0u8; self.buffer_size.max(1)];
        let mut framer = LineFramer::new();
        let name = self.transport.name();
        tracing::debug!("Read loop started for {}", name);

        while !self.cancel.load(Ordering::Acquire) {
            match self.transport.read(&mut buffer, self.timeout) {
                Ok(0) => self.flush_partial(&mut framer),
                Ok(n) => {
                    for line in framer.push(&buffer[..n]) {
                        self.handle_line(&line);
                    }
                }
                Err(e) if e.is_timeout() => self.flush_partial(&mut framer),
                Err(e) => {
                    if self.cancel.load(Ordering::Acquire) {
                        break;
                    }
                    tracing::error!("Error reading serial data: {}", e);
                    self.shared
                        .state
                        .append_log(format!("Error reading serial data: {}", e));
                    self.shared
                        .teardown(Some(self.generation), "Disconnected from USB device");
                    break;
                }
            }
        }

        tracing::debug!("Read loop stopped for {}", name);
    }

    /// A device that omits the newline still gets its text logged once idle.
    fn flush_partial(&self, framer: &mut LineFramer) {
        if let Some(line) = framer.flush() {
            self.handle_line(&line);
        }
    }

    fn handle_line(&self, line: &str) {
        let message = line.trim();
        if message.is_empty() {
            return;
        }

        tracing::debug!("Received: {}", message);
        self.shared.state.append_log(format!("Received: {}", message));

        match InboundMessage::decode(message) {
            InboundMessage::DefaultMode(mode) => {
                tracing::info!("Startup mode: {}", mode);
                self.shared.state.set_remote_mode(mode);
            }
            InboundMessage::Text(_) => {}
        }
    }
}

/// Owner of one serial connection and its observable state
pub struct Session {
    config: SessionConfig,
    discovery: Arc<dyn DeviceDiscovery>,
    shared: Arc<Shared>,
    /// Serializes connect/disconnect and owns the read thread handle
    lifecycle: Mutex<Option<ReadLoop>>,
}

impl Session {
    /// Create an idle session
    pub fn new(discovery: Arc<dyn DeviceDiscovery>, config: SessionConfig) -> Self {
        let state = Arc::new(SessionState::new(
            config.log_capacity,
            EventDispatcher::default(),
        ));
        Self {
            config,
            discovery,
            shared: Arc::new(Shared {
                link: Mutex::new(Link::idle()),
                state,
            }),
            lifecycle: Mutex::new(None),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Observable state store
    pub fn state(&self) -> &Arc<SessionState> {
        &self.shared.state
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.shared.link.lock().phase
    }

    /// Device being connected, connected, or awaiting permission
    pub fn device(&self) -> Option<DeviceHandle> {
        self.shared.link.lock().device.clone()
    }

    /// Whether the read thread is alive
    pub fn is_reading(&self) -> bool {
        self.lifecycle
            .lock()
            .as_ref()
            .is_some_and(|read_loop| !read_loop.handle.is_finished())
    }

    /// Whether a transport is open
    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    /// Rendered log entries, oldest first
    pub fn log_snapshot(&self) -> Vec<String> {
        self.shared.state.log_snapshot()
    }

    /// Last power-up mode reported by the device
    pub fn remote_mode(&self) -> Option<Mode> {
        self.shared.state.remote_mode()
    }

    /// Consistent copy of all observable fields
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.snapshot()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.state.events().subscribe()
    }

    /// Register a listener.
    ///
    /// Listeners run on whichever thread changed the state and must not call
    /// `connect`, `request_access` or `permission_result` from a callback.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        self.shared.state.events().add_listener(listener)
    }

    /// Remove a listener
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.shared.state.events().remove_listener(handle)
    }

    /// Register a closure fired for user-facing failures
    pub fn on_alert<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(AlertListener(callback)))
    }

    /// Append an informational entry to the log
    pub fn record(&self, message: impl Into<String>) {
        self.shared.state.append_log(message);
    }

    /// Open `device` and start reading from it.
    ///
    /// Falls back to requesting access when the device is not accessible yet.
    pub fn connect(&self, device: &DeviceHandle) -> ConnectOutcome {
        self.connect_with(device, true)
    }

    fn connect_with(&self, device: &DeviceHandle, may_request_access: bool) -> ConnectOutcome {
        let mut read_loop = self.lifecycle.lock();

        if let Some(outcome) = self.check_busy(device) {
            return outcome;
        }

        // A previous read thread may still be finishing a link-lost teardown.
        if let Some(previous) = read_loop.take() {
            previous.stop();
        }

        {
            let mut link = self.shared.link.lock();
            link.phase = SessionPhase::Connecting;
            link.device = Some(device.clone());
        }
        tracing::info!("Connecting to {}", device);

        let transport = match self.open_transport(device) {
            Ok(transport) => transport,
            Err(e) if e.is_permission_denied() && may_request_access => {
                return self.await_permission(device)
            }
            Err(e) => {
                tracing::error!("Error connecting to device {}: {}", device, e);
                self.set_idle();
                self.shared
                    .state
                    .append_log(format!("Error connecting to device: {}", e));
                return ConnectOutcome::Failed;
            }
        };

        let generation = {
            let mut link = self.shared.link.lock();
            link.generation += 1;
            link.phase = SessionPhase::Connected;
            link.transport = Some(transport.clone());
            link.generation
        };

        tracing::info!("Connected to USB device: {}", device);
        self.shared.state.set_connected(
            true,
            format!("Connected to USB device: {}", device.path),
        );

        match self.spawn_read_loop(transport, generation) {
            Ok(handle) => {
                *read_loop = Some(handle);
                ConnectOutcome::Connected
            }
            Err(e) => {
                tracing::error!("Failed to start read loop: {}", e);
                self.shared
                    .state
                    .append_log(format!("Failed to start serial reader: {}", e));
                self.shared
                    .teardown(Some(generation), "Disconnected from USB device");
                ConnectOutcome::Failed
            }
        }
    }

    /// Ask the OS for access to `device` and wait for the answer
    pub fn request_access(&self, device: &DeviceHandle) -> ConnectOutcome {
        let _read_loop = self.lifecycle.lock();
        if let Some(outcome) = self.check_busy(device) {
            return outcome;
        }
        self.await_permission(device)
    }

    /// Resolve an access request
    pub fn permission_result(&self, device: &DeviceHandle, result: AccessResult) -> ConnectOutcome {
        match result {
            AccessResult::Granted => {
                tracing::info!("USB permission granted for {}", device);
                // Never ask twice for the same grant; a refused open now is a failure.
                self.connect_with(device, false)
            }
            AccessResult::Denied => {
                let _read_loop = self.lifecycle.lock();
                {
                    let mut link = self.shared.link.lock();
                    if link.phase == SessionPhase::AwaitingPermission
                        && link.device.as_ref() == Some(device)
                    {
                        link.phase = SessionPhase::Idle;
                        link.device = None;
                    }
                }
                tracing::warn!("USB permission denied for {}", device);
                self.shared
                    .state
                    .append_log(format!("USB permission denied for {}", device.path));
                ConnectOutcome::Denied
            }
        }
    }

    /// Close the transport and stop the read thread.
    ///
    /// Safe from any phase and any number of times. Returns true when this
    /// call performed a transition.
    pub fn disconnect(&self) -> bool {
        let mut read_loop = self.lifecycle.lock();
        if let Some(running) = read_loop.take() {
            running.stop();
        }
        self.shared.teardown(None, "Disconnected from USB device")
    }

    /// Disconnect and drop every listener
    pub fn shutdown(&self) {
        self.disconnect();
        self.shared.state.events().clear_listeners();
        tracing::debug!("Session shut down");
    }

    /// Parse collaborator text such as `mode:BLE` and send it.
    pub fn send(&self, command: &str) -> bool {
        match Command::parse(command) {
            Ok(command) => self.send_command(&command),
            Err(e) => {
                tracing::warn!("Rejected command {:?}: {}", command, e);
                self.shared
                    .state
                    .append_log(format!("Invalid command: {}", command.trim()));
                self.shared.state.alert(ALERT_INVALID_COMMAND, e.to_string());
                false
            }
        }
    }

    /// Write one command with a single bounded attempt
    pub fn send_command(&self, command: &Command) -> bool {
        let result = {
            let link = self.shared.link.lock();
            link.transport
                .as_ref()
                .filter(|transport| transport.is_open())
                .map(|transport| transport.write(&command.encode(), self.config.write_timeout))
        };

        match result {
            Some(Ok(())) => {
                tracing::info!("Sent via serial: {}", command);
                self.shared
                    .state
                    .append_log(format!("Sent via serial: {}", command));
                true
            }
            Some(Err(e)) => {
                tracing::error!("Error sending serial data: {}", e);
                self.shared
                    .state
                    .append_log(format!("Error sending serial data: {}", e));
                self.shared
                    .state
                    .alert(ALERT_SERIAL_ERROR, format!("Failed to send data: {}", e));
                false
            }
            None => {
                tracing::debug!("USB serial port not available");
                self.shared.state.append_log("USB serial port not available");
                self.shared.state.alert(
                    ALERT_PORT_UNAVAILABLE,
                    "USB serial port is not connected. Please connect a USB serial device.",
                );
                false
            }
        }
    }

    fn check_busy(&self, device: &DeviceHandle) -> Option<ConnectOutcome> {
        let link = self.shared.link.lock();
        match link.phase {
            SessionPhase::Connecting | SessionPhase::Connected => {
                if link.device.as_ref() == Some(device) {
                    Some(ConnectOutcome::AlreadyConnected)
                } else {
                    tracing::debug!(
                        "Ignoring {} while {} on {:?}",
                        device,
                        link.phase,
                        link.device.as_ref().map(|d| d.path.as_str())
                    );
                    Some(ConnectOutcome::Busy)
                }
            }
            _ => None,
        }
    }

    fn await_permission(&self, device: &DeviceHandle) -> ConnectOutcome {
        {
            let mut link = self.shared.link.lock();
            link.phase = SessionPhase::AwaitingPermission;
            link.device = Some(device.clone());
        }
        tracing::info!("Requesting USB permission for {}", device);
        self.shared
            .state
            .append_log(format!("Requesting permission for USB device: {}", device.path));

        match self.discovery.request_access(device) {
            Ok(()) => ConnectOutcome::AwaitingPermission,
            Err(e) => {
                tracing::error!("Failed to request permission for {}: {}", device, e);
                self.set_idle();
                self.shared
                    .state
                    .append_log(format!("Failed to request permission: {}", e));
                ConnectOutcome::Failed
            }
        }
    }

    fn open_transport(&self, device: &DeviceHandle) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = Arc::from(self.discovery.try_open(device)?);
        if let Err(e) = transport.configure(&self.config.line_params) {
            transport.close();
            return Err(e);
        }
        Ok(transport)
    }

    fn spawn_read_loop(&self, transport: Arc<dyn Transport>, generation: u64) -> Result<ReadLoop> {
        let cancel = Arc::new(AtomicBool::new(false));
        let context = ReadContext {
            shared: self.shared.clone(),
            transport,
            cancel: cancel.clone(),
            generation,
            timeout: self.config.read_timeout,
            buffer_size: self.config.read_buffer_size,
        };

        let handle = std::thread::Builder::new()
            .name("jester-serial-reader".to_string())
            .spawn(move || context.run())
            .map_err(Error::Io)?;

        Ok(ReadLoop { cancel, handle })
    }

    fn set_idle(&self) {
        let mut link = self.shared.link.lock();
        link.phase = SessionPhase::Idle;
        link.device = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.shared.link.lock();
        f.debug_struct("Session")
            .field("phase", &link.phase)
            .field("device", &link.device)
            .field("config", &self.config)
            .finish()
    }
}
