//! JSON adapter over a [`KeyValueStore`].
//!
//! Reads never fail: a missing key, a backend error and an undecodable
//! document all come back as `None`, with a notice for the latter two.
//! Writes never fail either; errors are logged, published on the event bus
//! and returned as a plain `false` for callers that care.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use companion_core::events::EventBus;

use crate::backend::KeyValueStore;

/// Typed, failure-tolerant access to the durable store.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn KeyValueStore>,
    events: EventBus,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish_non_exhaustive()
    }
}

impl DurableStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self { backend, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Decode the value under `key`.
    ///
    /// Returns `None` when the key was never written, when the backend cannot
    /// be read, or when the stored document does not decode as `T`. Callers
    /// treat all three the same way.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Store read failed");
                self.events
                    .warning(format!("Could not read saved data ({})", key));
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Stored document is corrupt, ignoring it");
                self.events
                    .error(format!("Failed to load saved data ({})", key));
                None
            }
        }
    }

    /// Encode and write `value` under `key`.
    ///
    /// Failures are reported through the event bus and the log; the return
    /// value only says whether the write landed.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, error = %e, "Could not encode value for the store");
                self.events
                    .warning(format!("Could not save data ({}): {}", key, e));
                return false;
            }
        };

        match self.backend.set(key, &encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Store write failed");
                self.events
                    .warning(format!("Could not save data ({}): {}", key, e));
                false
            }
        }
    }

    /// Remove `key`; failures are reported like [`DurableStore::save`].
    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Store remove failed");
                self.events
                    .warning(format!("Could not remove data ({}): {}", key, e));
                false
            }
        }
    }
}
