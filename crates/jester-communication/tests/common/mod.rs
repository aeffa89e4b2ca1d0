//! Mock devices shared by the session and router tests

#![allow(dead_code)]

use jester_communication::{DeviceDiscovery, DeviceHandle, SessionConfig, Transport};
use jester_core::{ConnectionError, LineParams, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session settings short enough for tests
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        read_timeout: Duration::from_millis(20),
        write_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

enum Step {
    Data(Vec<u8>),
    Fail(String),
}

/// Scriptable device behind a [`MockTransport`]
pub struct MockDevice {
    pub path: String,
    inbound: Mutex<VecDeque<Step>>,
    arrived: Condvar,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
    reads: AtomicUsize,
    write_error: Mutex<Option<ConnectionError>>,
    configured: Mutex<Option<LineParams>>,
    counters: Arc<OpenCounters>,
}

impl MockDevice {
    /// Queue bytes for the next read
    pub fn feed(&self, bytes: &[u8]) {
        self.inbound.lock().push_back(Step::Data(bytes.to_vec()));
        self.arrived.notify_all();
    }

    /// Queue several reads at once so no idle timeout falls between them
    pub fn feed_chunks(&self, chunks: &[&[u8]]) {
        self.inbound
            .lock()
            .extend(chunks.iter().map(|chunk| Step::Data(chunk.to_vec())));
        self.arrived.notify_all();
    }

    /// Make the next read fail with an I/O error
    pub fn fail_next_read(&self, reason: &str) {
        self.inbound.lock().push_back(Step::Fail(reason.to_string()));
        self.arrived.notify_all();
    }

    /// Make every write fail with `error`
    pub fn fail_writes(&self, error: ConnectionError) {
        *self.write_error.lock() = Some(error);
    }

    /// Everything written so far, as text
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }

    /// Number of read calls made
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Whether the transport is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Line parameters applied by the session
    pub fn configured(&self) -> Option<LineParams> {
        *self.configured.lock()
    }
}

/// Counts transports open at the same time across one discovery
#[derive(Default)]
pub struct OpenCounters {
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    total_opened: AtomicUsize,
}

impl OpenCounters {
    fn opened(&self) {
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.total_opened.fetch_add(1, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport over a [`MockDevice`]
pub struct MockTransport(Arc<MockDevice>);

impl Transport for MockTransport {
    fn name(&self) -> String {
        self.0.path.clone()
    }

    fn configure(&self, params: &LineParams) -> Result<()> {
        *self.0.configured.lock() = Some(*params);
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let device = &self.0;
        if !device.is_open() {
            return Err(ConnectionError::NotConnected.into());
        }
        device.reads.fetch_add(1, Ordering::SeqCst);

        let mut inbound = device.inbound.lock();
        if inbound.is_empty() {
            device.arrived.wait_for(&mut inbound, timeout);
        }

        match inbound.pop_front() {
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    inbound.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Fail(reason)) => Err(ConnectionError::io(reason).into()),
            None => Err(ConnectionError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    fn write(&self, data: &[u8], _timeout: Duration) -> Result<()> {
        let device = &self.0;
        if !device.is_open() {
            return Err(ConnectionError::NotConnected.into());
        }
        if let Some(error) = device.write_error.lock().clone() {
            return Err(error.into());
        }
        device.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn close(&self) {
        if self.0.open.swap(false, Ordering::SeqCst) {
            self.0.counters.closed();
        }
    }

    fn is_open(&self) -> bool {
        self.0.is_open()
    }
}

/// In-memory discovery handing out [`MockTransport`]s
#[derive(Default)]
pub struct MockDiscovery {
    devices: Mutex<Vec<DeviceHandle>>,
    granted: Mutex<HashSet<String>>,
    busy: Mutex<HashSet<String>>,
    access_requests: Mutex<Vec<DeviceHandle>>,
    opened: Mutex<HashMap<String, Arc<MockDevice>>>,
    counters: Arc<OpenCounters>,
}

impl MockDiscovery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a device visible to enumeration
    pub fn plug(&self, path: &str) -> DeviceHandle {
        let device = DeviceHandle::new(path).with_usb_ids(0x2341, 0x0043);
        self.devices.lock().push(device.clone());
        device
    }

    /// Remove a device from enumeration
    pub fn unplug(&self, path: &str) {
        self.devices.lock().retain(|d| d.path != path);
    }

    /// Let `try_open` succeed for a path
    pub fn grant(&self, path: &str) {
        self.granted.lock().insert(path.to_string());
    }

    /// Make `try_open` fail as busy
    pub fn set_busy(&self, path: &str) {
        self.busy.lock().insert(path.to_string());
    }

    /// Access requests received so far
    pub fn access_requests(&self) -> Vec<DeviceHandle> {
        self.access_requests.lock().clone()
    }

    /// Latest device opened for `path`
    pub fn device(&self, path: &str) -> Option<Arc<MockDevice>> {
        self.opened.lock().get(path).cloned()
    }

    /// Most transports that were open at the same time
    pub fn max_open(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    /// Transports open right now
    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    /// Transports ever opened
    pub fn total_opened(&self) -> usize {
        self.counters.total_opened.load(Ordering::SeqCst)
    }
}

impl DeviceDiscovery for MockDiscovery {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        Ok(self.devices.lock().clone())
    }

    fn request_access(&self, device: &DeviceHandle) -> Result<()> {
        self.access_requests.lock().push(device.clone());
        Ok(())
    }

    fn try_open(&self, device: &DeviceHandle) -> Result<Box<dyn Transport>> {
        if !self.granted.lock().contains(&device.path) {
            return Err(ConnectionError::NoPermission {
                device: device.path.clone(),
            }
            .into());
        }
        if self.busy.lock().contains(&device.path) {
            return Err(ConnectionError::DeviceBusy {
                device: device.path.clone(),
            }
            .into());
        }

        let mock = Arc::new(MockDevice {
            path: device.path.clone(),
            inbound: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
            write_error: Mutex::new(None),
            configured: Mutex::new(None),
            counters: self.counters.clone(),
        });
        self.counters.opened();
        self.opened.lock().insert(device.path.clone(), mock.clone());
        Ok(Box::new(MockTransport(mock)))
    }
}

/// Log entries without their `[HH:MM:SS] ` prefix
pub fn messages(log: &[String]) -> Vec<String> {
    log.iter()
        .map(|entry| entry.split_once("] ").map_or(entry.clone(), |(_, m)| m.to_string()))
        .collect()
}

/// Count log entries equal to `message`
pub fn count(log: &[String], message: &str) -> usize {
    messages(log).iter().filter(|m| m.as_str() == message).count()
}
