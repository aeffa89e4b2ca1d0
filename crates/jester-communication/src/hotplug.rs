//! Hot-plug monitor
//!
//! Desktop hosts have no attach/detach broadcasts, so the monitor polls
//! enumeration and emits [`DeviceEvent::Attached`] / [`DeviceEvent::Detached`]
//! for the difference between two scans.

use crate::discovery::{DeviceDiscovery, DeviceEvent, DeviceHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Polls a discovery and reports changes
pub struct HotplugMonitor {
    discovery: Arc<dyn DeviceDiscovery>,
    interval: Duration,
    events: UnboundedSender<DeviceEvent>,
    known: Vec<DeviceHandle>,
}

impl HotplugMonitor {
    /// Create a monitor. Devices present at the first scan are not reported;
    /// a resume event covers those.
    pub fn new(
        discovery: Arc<dyn DeviceDiscovery>,
        interval: Duration,
        events: UnboundedSender<DeviceEvent>,
    ) -> Self {
        let known = discovery.enumerate().unwrap_or_default();
        Self {
            discovery,
            interval,
            events,
            known,
        }
    }

    /// Devices seen at the last scan
    pub fn known(&self) -> &[DeviceHandle] {
        &self.known
    }

    /// Scan once and emit events for every change.
    ///
    /// Returns false once the receiving side is gone.
    pub fn poll_once(&mut self) -> bool {
        let current = match self.discovery.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Hot-plug scan failed: {}", e);
                return !self.events.is_closed();
            }
        };

        let detached: Vec<DeviceHandle> = self
            .known
            .iter()
            .filter(|device| !current.contains(device))
            .cloned()
            .collect();
        let attached: Vec<DeviceHandle> = current
            .iter()
            .filter(|device| !self.known.contains(device))
            .cloned()
            .collect();

        self.known = current;

        for device in detached {
            tracing::debug!("Hot-plug: {} removed", device);
            if self.events.send(DeviceEvent::Detached(device)).is_err() {
                return false;
            }
        }
        for device in attached {
            tracing::debug!("Hot-plug: {} added", device);
            if self.events.send(DeviceEvent::Attached(device)).is_err() {
                return false;
            }
        }

        !self.events.is_closed()
    }

    /// Poll on the configured interval until the receiver is dropped.
    ///
    /// Port enumeration blocks, so each scan runs on the blocking pool.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            let mut monitor = self;
            loop {
                ticker.tick().await;
                let scan = tokio::task::spawn_blocking(move || {
                    let keep_going = monitor.poll_once();
                    (monitor, keep_going)
                })
                .await;

                match scan {
                    Ok((scanned, true)) => monitor = scanned,
                    Ok((_, false)) => break,
                    Err(e) => {
                        tracing::error!("Hot-plug scan task failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Hot-plug monitor stopped");
        })
    }
}
