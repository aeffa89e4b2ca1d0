//! Session event distribution
//!
//! Publishes every state change twice:
//! - synchronously to registered [`SessionListener`]s, on the publishing thread
//! - through a `tokio::sync::broadcast` channel for async receivers
//!
//! Listeners must return quickly; they run on the session's read thread for
//! device-originated events.

use crate::protocol::Mode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event published by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connected flag changed
    ConnectionChanged(bool),
    /// A rendered entry was appended to the log
    LogAppended(String),
    /// The device reported its power-up mode
    RemoteModeChanged(Mode),
    /// A user-initiated action failed
    Alert {
        /// Short title
        title: String,
        /// Human readable detail
        message: String,
    },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ConnectionChanged(true) => write!(f, "Connected"),
            SessionEvent::ConnectionChanged(false) => write!(f, "Disconnected"),
            SessionEvent::LogAppended(entry) => write!(f, "{}", entry),
            SessionEvent::RemoteModeChanged(mode) => write!(f, "Remote mode: {}", mode),
            SessionEvent::Alert { title, message } => write!(f, "{}: {}", title, message),
        }
    }
}

/// Handle for a registered session listener.
///
/// Returned by [`EventDispatcher::add_listener`]; pass it back to remove the
/// listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({})", &self.0.to_string()[..8])
    }
}

/// Listener trait for session events
///
/// Implement the callbacks of interest; the rest default to no-ops.
pub trait SessionListener: Send + Sync {
    /// Called when the connected flag changes
    fn on_connection_changed(&self, _connected: bool) {}

    /// Called with every rendered log entry
    fn on_log(&self, _entry: &str) {}

    /// Called when the device reports its power-up mode
    fn on_remote_mode(&self, _mode: Mode) {}

    /// Called for user-facing failures
    fn on_alert(&self, _title: &str, _message: &str) {}
}

/// Adapter turning a closure into an alert-only listener
pub struct AlertListener<F>(pub F);

impl<F> SessionListener for AlertListener<F>
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn on_alert(&self, title: &str, message: &str) {
        (self.0)(title, message)
    }
}

/// Event dispatcher for publishing session events
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender for async receivers.
    tx: broadcast::Sender<SessionEvent>,
    /// Registered synchronous listeners.
    listeners: Arc<RwLock<HashMap<ListenerHandle, Arc<dyn SessionListener>>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self {
            tx,
            listeners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to the broadcast stream
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Register a synchronous listener
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        let handle = ListenerHandle::new();
        self.listeners.write().insert(handle, listener);
        tracing::debug!("{} added", handle);
        handle
    }

    /// Remove a listener. Returns true if it was registered.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.write().remove(&handle).is_some();
        if removed {
            tracing::debug!("{} removed", handle);
        }
        removed
    }

    /// Drop every listener
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of broadcast receivers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event to listeners and broadcast receivers
    ///
    /// Returns the number of broadcast receivers reached.
    pub fn publish(&self, event: SessionEvent) -> usize {
        // Listeners may re-enter the dispatcher, so call them on a copy.
        let listeners: Vec<Arc<dyn SessionListener>> =
            self.listeners.read().values().cloned().collect();

        for listener in &listeners {
            match &event {
                SessionEvent::ConnectionChanged(connected) => {
                    listener.on_connection_changed(*connected)
                }
                SessionEvent::LogAppended(entry) => listener.on_log(entry),
                SessionEvent::RemoteModeChanged(mode) => listener.on_remote_mode(*mode),
                SessionEvent::Alert { title, message } => listener.on_alert(title, message),
            }
        }

        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
