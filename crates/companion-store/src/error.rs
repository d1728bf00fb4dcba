//! Error types for the durable store.

use companion_core::error::CompanionError;

/// Errors from a key-value store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for CompanionError {
    fn from(err: StoreError) -> Self {
        CompanionError::Storage(err.to_string())
    }
}
