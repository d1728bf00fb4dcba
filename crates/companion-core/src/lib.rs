pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::CompanionConfig;
pub use error::{CompanionError, Result};
pub use events::{EngineEvent, EventBus, NoticeLevel};
pub use types::*;
