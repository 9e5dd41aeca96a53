//! Notification sink interface.
//!
//! The engine and route gate report user-facing events (role switches,
//! timeouts, denied routes) as structured notifications; the presentation
//! layer decides how to render them. This keeps toast/alert side effects
//! out of state-transition code.

use std::sync::Mutex;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Something failed in a way the user should know about.
    Error,
    /// Neutral information.
    Info,
    /// A requested action succeeded.
    Success,
}

/// Receives user-facing notifications from the engine and route gate.
pub trait NotificationSink: Send + Sync {
    /// Reports a notification.
    fn notify(&self, kind: NotificationKind, message: &str);
}

impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    fn notify(&self, kind: NotificationKind, message: &str) {
        (**self).notify(kind, message);
    }
}

/// A sink that discards all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _kind: NotificationKind, _message: &str) {}
}

/// A sink that records notifications in memory, for tests and debugging.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(NotificationKind, String)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded notifications.
    #[must_use]
    pub fn entries(&self) -> Vec<(NotificationKind, String)> {
        self.entries.lock().unwrap().clone()
    }

    /// Returns true if any recorded notification of the given kind contains
    /// the given fragment.
    #[must_use]
    pub fn contains(&self, kind: NotificationKind, fragment: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(k, m)| *k == kind && m.contains(fragment))
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, kind: NotificationKind, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((kind, message.to_string()));
    }
}
