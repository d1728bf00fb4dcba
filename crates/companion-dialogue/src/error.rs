//! Error types for the dialogue flow.

use companion_core::error::CompanionError;

use crate::state::Stage;

/// Errors from the dialogue controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialogueError {
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("stage {0} has no back target")]
    NoBackTarget(Stage),
    #[error("action requires stage {expected}, current stage is {actual}")]
    WrongStage { expected: Stage, actual: Stage },
    #[error("form is incomplete: {0}")]
    IncompleteForm(String),
    #[error("unknown {kind}: {id}")]
    UnknownEntry { kind: &'static str, id: String },
    #[error("{0} is away and cannot take a chat")]
    AgentUnavailable(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("desk error: {0}")]
    Desk(String),
}

impl From<DialogueError> for CompanionError {
    fn from(err: DialogueError) -> Self {
        CompanionError::Dialogue(err.to_string())
    }
}
