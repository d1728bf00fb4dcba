//! Conversation engine for the companion front end.
//!
//! Owns the conversation threads, persists them with debouncing, and runs
//! user turns through context trimming, generation and reply insertion.

pub mod attachments;
pub mod client;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod health;
pub mod persistence;
pub mod pipeline;
pub mod repository;
pub mod settings;
pub mod title;

pub use attachments::{AttachmentRegistry, AttachmentUpload};
pub use client::HttpGenerationClient;
pub use error::{ChatError, GenerationError};
pub use feedback::{FeedbackEntry, FeedbackLog, FeedbackRating};
pub use generation::{
    GenerationOptions, GenerationReply, GenerationRequest, GenerationService, HistoryTurn,
};
pub use health::{BackendStatus, HealthProbe, LearningStats, LearningStatus};
pub use persistence::PersistenceHandle;
pub use pipeline::{EditOutcome, PipelineConfig, TurnOutcome, TurnPipeline};
pub use repository::ConversationRepository;
pub use settings::{EngineSettings, FeatureAccess, FeatureFlag, UserRole};
pub use title::derive_title;
