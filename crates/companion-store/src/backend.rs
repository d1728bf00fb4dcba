//! The raw key-value store port.

use crate::error::StoreError;

/// A synchronous, size-limited string store.
///
/// Single reader and single writer per device; implementations do not need
/// cross-process locking.
pub trait KeyValueStore: Send + Sync {
    /// Raw value stored under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Bytes a store accounts for an entry.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
