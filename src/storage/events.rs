//! Queue Notifications
//!
//! Listeners are plain functions registered on a queue. They run
//! synchronously, in registration order, after the triggering operation has
//! committed and released its gate.

use crate::error::QueueError;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Something that happened to a queue.
#[derive(Debug)]
pub enum QueueEvent {
    /// An entry was written
    Queued { key: String },
    /// An entry was read
    Dequeued { key: String },
    /// An entry file was removed
    Deleted { key: String },
    /// An expiration record was consumed by an expire
    Expired { key: String },
    /// Every file in the queue directory was removed
    Cleared,
    /// A non-fatal problem, e.g. a corrupt index line or a failed sweep
    Diagnostic(QueueError),
}

impl QueueEvent {
    /// Short name of the event kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::Queued { .. } => "queued",
            QueueEvent::Dequeued { .. } => "dequeued",
            QueueEvent::Deleted { .. } => "deleted",
            QueueEvent::Expired { .. } => "expired",
            QueueEvent::Cleared => "cleared",
            QueueEvent::Diagnostic(_) => "diagnostic",
        }
    }

    /// The entry key the event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            QueueEvent::Queued { key }
            | QueueEvent::Dequeued { key }
            | QueueEvent::Deleted { key }
            | QueueEvent::Expired { key } => Some(key),
            QueueEvent::Cleared | QueueEvent::Diagnostic(_) => None,
        }
    }
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueEvent::Cleared => write!(f, "queue cleared"),
            QueueEvent::Diagnostic(err) => write!(f, "diagnostic: {}", err),
            other => write!(f, "entry {}: {}", other.kind(), other.key().unwrap_or("")),
        }
    }
}

/// A registered notification callback.
pub type Listener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// The ordered list of listeners attached to one queue.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It receives every event emitted afterwards.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener.
    ///
    /// The listener list is snapshotted first so a listener may subscribe
    /// further listeners without deadlocking.
    pub fn emit(&self, event: QueueEvent) {
        trace!(event = event.kind(), key = event.key().unwrap_or(""), "Emitting queue event");

        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in snapshot {
            listener(&event);
        }
    }
}
