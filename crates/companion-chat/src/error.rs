//! Error types for the conversation engine.

use std::time::Duration;

use companion_core::error::CompanionError;
use companion_core::types::{ConversationId, MessageId};
use companion_store::StoreError;

/// Errors from a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Backend service is currently unavailable")]
    Unavailable,
    #[error("Backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not reach the backend: {0}")]
    Transport(String),
    #[error("Backend reply was malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenerationError::Malformed(err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Errors from the conversation repository and the turn pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("edited message cannot be empty")]
    EmptyEdit,
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("a reply is already pending in conversation {0}")]
    TurnInFlight(ConversationId),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("feedback collection is turned off")]
    FeedbackDisabled,
    #[error("only assistant replies can be rated: {0}")]
    NotAnAssistantReply(MessageId),
    #[error("message already rated: {0}")]
    AlreadyRated(MessageId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<ChatError> for CompanionError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Generation(e) => CompanionError::Generation(e.to_string()),
            ChatError::Storage(e) => CompanionError::Storage(e),
            other => CompanionError::Dialogue(other.to_string()),
        }
    }
}
