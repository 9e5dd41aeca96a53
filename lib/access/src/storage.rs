//! Durable client storage interface.
//!
//! The engine persists two hints across reloads: the active role and the
//! signed-in email. Both are seeds for the very first synchronous render
//! before resolution completes; storage is never the sole source of truth
//! at read time. The interface is injected so the engine is testable
//! without a real browser or platform keystore.

use std::collections::HashMap;
use std::sync::Mutex;

/// Storage key for the persisted active role.
pub const ACTIVE_ROLE_KEY: &str = "agentdesk.active_role";

/// Storage key for the cached signed-in email.
pub const CACHED_EMAIL_KEY: &str = "agentdesk.cached_email";

/// Key-value storage that survives application restarts.
///
/// Writes are last-writer-wins and are always paired with an in-memory
/// update in the same transition.
pub trait DurableStorage: Send + Sync {
    /// Returns the stored value for a key, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value, replacing any previous one.
    fn set(&self, key: &str, value: &str);

    /// Removes a key.
    fn remove(&self, key: &str);
}

/// In-memory storage, for tests and hosts without platform storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: DurableStorage + ?Sized> DurableStorage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}
