//! Event router
//!
//! Turns host lifecycle and hardware events into session operations. Only one
//! device holds the session at a time: an attach for a second device while
//! the first is connected is queued and replayed after the next detach.

use crate::discovery::{AccessResult, DeviceDiscovery, DeviceEvent, DeviceHandle};
use crate::session::{ConnectOutcome, Session, SessionPhase};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Dispatches [`DeviceEvent`]s to a [`Session`]
pub struct EventRouter {
    session: Arc<Session>,
    discovery: Arc<dyn DeviceDiscovery>,
    /// Attach/detach/permission events are only handled while subscribed
    subscribed: bool,
    /// Device that attached while another one held the session
    pending: Option<DeviceHandle>,
    destroyed: bool,
}

impl EventRouter {
    /// Create a router. It starts unsubscribed until the first resume.
    pub fn new(session: Arc<Session>, discovery: Arc<dyn DeviceDiscovery>) -> Self {
        Self {
            session,
            discovery,
            subscribed: false,
            pending: None,
            destroyed: false,
        }
    }

    /// Session driven by this router
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether hardware events are currently handled
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Device queued behind the current session
    pub fn pending(&self) -> Option<&DeviceHandle> {
        self.pending.as_ref()
    }

    /// Whether `on_destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Route one event
    pub fn handle(&mut self, event: DeviceEvent) {
        if self.destroyed {
            tracing::debug!("Router destroyed, dropping {}", event);
            return;
        }

        match event {
            DeviceEvent::Resumed => self.on_resume(),
            DeviceEvent::Paused => self.on_pause(),
            DeviceEvent::Destroyed => self.on_destroy(),
            hardware if !self.subscribed => {
                tracing::debug!("Not subscribed, dropping {}", hardware);
            }
            DeviceEvent::Attached(device) => self.on_device_attached(device),
            DeviceEvent::Detached(device) => self.on_device_detached(device),
            DeviceEvent::PermissionResult { device, result } => {
                self.on_permission_result(device, result)
            }
        }
    }

    /// Drain a channel until it closes or a destroy event arrives.
    ///
    /// Session calls block, so run this on a dedicated thread
    /// (e.g. `tokio::task::spawn_blocking`).
    pub fn run_blocking(mut self, mut events: UnboundedReceiver<DeviceEvent>) {
        while let Some(event) = events.blocking_recv() {
            self.handle(event);
            if self.destroyed {
                break;
            }
        }
        if !self.destroyed {
            self.on_destroy();
        }
        tracing::debug!("Event router stopped");
    }

    /// Subscribe and connect to the first device present, if idle
    pub fn on_resume(&mut self) {
        self.subscribed = true;
        tracing::debug!("Resumed; listening for device events");

        if self.session.phase() != SessionPhase::Idle {
            return;
        }

        let devices = match self.discovery.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Failed to enumerate USB devices: {}", e);
                self.session
                    .record(format!("Failed to enumerate USB devices: {}", e));
                return;
            }
        };

        match devices.into_iter().next() {
            Some(device) => {
                let outcome = self.session.connect(&device);
                tracing::debug!("Resume connect to {}: {:?}", device, outcome);
            }
            None => {
                tracing::debug!("No USB serial drivers found");
                self.session.record("No USB serial drivers found");
            }
        }
    }

    /// Stop handling hardware events; the session stays as it is
    pub fn on_pause(&mut self) {
        self.subscribed = false;
        tracing::debug!("Paused; ignoring device events");
    }

    /// Ask for access to a newly attached device
    pub fn on_device_attached(&mut self, device: DeviceHandle) {
        tracing::info!("USB device attached: {}", device);

        match self.session.request_access(&device) {
            ConnectOutcome::Busy => {
                tracing::info!("Queueing {} until the current device detaches", device);
                self.session.record(format!(
                    "Device {} queued until the current device is detached",
                    device.path
                ));
                self.pending = Some(device);
            }
            outcome => tracing::debug!("Attach of {}: {:?}", device, outcome),
        }
    }

    /// Tear the session down, then replay a queued attach
    pub fn on_device_detached(&mut self, device: DeviceHandle) {
        tracing::info!("USB device detached: {}", device);
        self.session.disconnect();

        match self.pending.take() {
            Some(queued) if queued != device => self.on_device_attached(queued),
            Some(_) => tracing::debug!("Queued device {} went away", device),
            None => {}
        }
    }

    /// Connect on grant; log and stay idle on denial
    pub fn on_permission_result(&mut self, device: DeviceHandle, result: AccessResult) {
        let outcome = self.session.permission_result(&device, result);
        if outcome == ConnectOutcome::Busy {
            self.pending = Some(device);
        }
    }

    /// Disconnect and release everything; later events are ignored
    pub fn on_destroy(&mut self) {
        self.subscribed = false;
        self.pending = None;
        self.destroyed = true;
        self.session.shutdown();
        tracing::debug!("Router destroyed");
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("subscribed", &self.subscribed)
            .field("pending", &self.pending)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
