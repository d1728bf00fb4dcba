//! Durable client-local key-value storage for the companion engine.
//!
//! A [`KeyValueStore`] is the raw, size-limited string store (in memory or a
//! directory of JSON documents). [`DurableStore`] layers JSON (de)serialization
//! on top, turning corrupt documents into absence and write failures into
//! notices instead of errors.

pub mod backend;
pub mod durable;
pub mod error;
pub mod file;
pub mod memory;

pub use backend::KeyValueStore;
pub use durable::DurableStore;
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
