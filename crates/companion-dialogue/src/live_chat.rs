//! Live-chat sub-pipeline of the widget.
//!
//! The twin of the main turn pipeline, over an independent, non-persisted
//! thread of [`ChatTurn`]s. Requests carry the configured persona.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use companion_chat::generation::{GenerationOptions, GenerationRequest, GenerationService, HistoryTurn};
use companion_chat::settings::EngineSettings;
use companion_chat::GenerationError;
use companion_core::config::{BackendConfig, ConversationConfig};
use companion_core::types::{MessageId, Persona, Sender};

/// One message of the widget's live-chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::User,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::Assistant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveChatConfig {
    pub persona: Persona,
    pub use_learning_model: bool,
    pub context_window: usize,
    pub request_timeout: Duration,
    pub user_id: Option<String>,
}

impl Default for LiveChatConfig {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            use_learning_model: false,
            context_window: 10,
            request_timeout: Duration::from_secs(10),
            user_id: None,
        }
    }
}

impl LiveChatConfig {
    pub fn new(
        conversations: &ConversationConfig,
        backend: &BackendConfig,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            persona: settings.persona(),
            use_learning_model: settings.use_learning_model,
            context_window: settings.context_window_or(conversations.context_window),
            request_timeout: backend.request_timeout(),
            user_id: backend.user_id.clone(),
        }
    }
}

pub struct LiveChat {
    generator: Arc<dyn GenerationService>,
    config: LiveChatConfig,
}

impl std::fmt::Debug for LiveChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveChat")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LiveChat {
    pub fn new(generator: Arc<dyn GenerationService>, config: LiveChatConfig) -> Self {
        Self { generator, config }
    }

    pub fn persona(&self) -> &Persona {
        &self.config.persona
    }

    /// Opening line of a fresh thread.
    pub fn greeting(&self) -> String {
        format!(
            "Hi there! I'm your {}. How can I help you today?",
            self.config.persona.name
        )
    }

    /// Generate the reply to `text`, given the turns that came before it.
    pub async fn reply(&self, prior: &[ChatTurn], text: &str) -> Result<String, GenerationError> {
        let skip = prior.len().saturating_sub(self.config.context_window);
        let request = GenerationRequest {
            message: text.to_string(),
            history: prior[skip..]
                .iter()
                .map(|turn| HistoryTurn {
                    role: turn.sender,
                    content: turn.text.clone(),
                })
                .collect(),
            options: GenerationOptions {
                user_id: self.config.user_id.clone(),
                personality: Some(self.config.persona.clone()),
                use_learning_model: self.config.use_learning_model,
            },
        };
        debug!(history = request.history.len(), persona = %self.config.persona.name, "Live chat request");

        match tokio::time::timeout(self.config.request_timeout, self.generator.generate(&request)).await {
            Ok(result) => result.map(|reply| reply.response),
            Err(_) => Err(GenerationError::Timeout(self.config.request_timeout)),
        }
    }
}
