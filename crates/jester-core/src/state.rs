//! Observable session state
//!
//! The session is the only writer. Collaborators read consistent snapshots
//! or listen through the [`EventDispatcher`]. The connected flag, the log and
//! the remote mode live under one lock so a reader never sees one of them
//! updated without the others.

use crate::event::{EventDispatcher, SessionEvent};
use crate::protocol::Mode;
use chrono::{DateTime, Local};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of log entries retained
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// A single timestamped log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local wall-clock time the entry was recorded
    pub timestamp: DateTime<Local>,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current local time
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Point-in-time copy of everything a collaborator can observe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Whether a transport is open
    pub connected: bool,
    /// Rendered log entries, oldest first
    pub log: Vec<String>,
    /// Last power-up mode the device reported
    pub remote_mode: Option<Mode>,
}

#[derive(Debug, Default)]
struct StateInner {
    connected: bool,
    log: VecDeque<LogEntry>,
    remote_mode: Option<Mode>,
}

/// Thread-safe store behind the collaborator-facing accessors
pub struct SessionState {
    inner: RwLock<StateInner>,
    /// Maximum log entries kept; 0 keeps everything
    log_capacity: usize,
    events: EventDispatcher,
    /// Keeps publication order equal to mutation order across threads.
    /// Reentrant so a listener may append to the log from its callback.
    publish_order: ReentrantMutex<()>,
}

impl SessionState {
    /// Create a store with the given log retention
    pub fn new(log_capacity: usize, events: EventDispatcher) -> Self {
        Self {
            inner: RwLock::new(StateInner::default()),
            log_capacity,
            events,
            publish_order: ReentrantMutex::new(()),
        }
    }

    /// Dispatcher used for publication
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Whether a transport is open
    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    /// Rendered log entries, oldest first
    pub fn log_snapshot(&self) -> Vec<String> {
        self.inner.read().log.iter().map(ToString::to_string).collect()
    }

    /// Raw log entries, oldest first
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.inner.read().log.iter().cloned().collect()
    }

    /// Last reported power-up mode
    pub fn remote_mode(&self) -> Option<Mode> {
        self.inner.read().remote_mode
    }

    /// Consistent copy of all observable fields
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            connected: inner.connected,
            log: inner.log.iter().map(ToString::to_string).collect(),
            remote_mode: inner.remote_mode,
        }
    }

    /// Append a log entry
    pub fn append_log(&self, message: impl Into<String>) {
        let _order = self.publish_order.lock();
        let rendered = {
            let mut inner = self.inner.write();
            self.push_entry(&mut inner, LogEntry::now(message))
        };
        self.events.publish(SessionEvent::LogAppended(rendered));
    }

    /// Flip the connected flag and record why, as one update.
    ///
    /// Returns false without logging when the flag already had that value.
    pub fn set_connected(&self, connected: bool, message: impl Into<String>) -> bool {
        let _order = self.publish_order.lock();
        let rendered = {
            let mut inner = self.inner.write();
            if inner.connected == connected {
                return false;
            }
            inner.connected = connected;
            self.push_entry(&mut inner, LogEntry::now(message))
        };
        self.events.publish(SessionEvent::ConnectionChanged(connected));
        self.events.publish(SessionEvent::LogAppended(rendered));
        true
    }

    /// Record a mode reported by the device, logging it in the same update
    pub fn set_remote_mode(&self, mode: Mode) {
        let _order = self.publish_order.lock();
        let rendered = {
            let mut inner = self.inner.write();
            inner.remote_mode = Some(mode);
            self.push_entry(&mut inner, LogEntry::now(format!("Startup mode: {}", mode)))
        };
        self.events.publish(SessionEvent::LogAppended(rendered));
        self.events.publish(SessionEvent::RemoteModeChanged(mode));
    }

    /// Fire a one-shot alert; alerts are not stored
    pub fn alert(&self, title: impl Into<String>, message: impl Into<String>) {
        let _order = self.publish_order.lock();
        self.events.publish(SessionEvent::Alert {
            title: title.into(),
            message: message.into(),
        });
    }

    fn push_entry(&self, inner: &mut StateInner, entry: LogEntry) -> String {
        let rendered = entry.to_string();
        inner.log.push_back(entry);
        if self.log_capacity > 0 {
            while inner.log.len() > self.log_capacity {
                inner.log.pop_front();
            }
        }
        rendered
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, EventDispatcher::default())
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionState")
            .field("connected", &inner.connected)
            .field("log_len", &inner.log.len())
            .field("remote_mode", &inner.remote_mode)
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}
