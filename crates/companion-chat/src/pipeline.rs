//! Turn pipeline.
//!
//! Takes one user turn through validation, the optimistic append of the user
//! message, context trimming, generation and reply insertion. At most one
//! turn per conversation is in flight; a second send is rejected rather than
//! queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use companion_core::config::{BackendConfig, ConversationConfig};
use companion_core::events::EngineEvent;
use companion_core::types::{Attachment, ConversationId, Message, MessageId, Timestamp};

use crate::attachments::AttachmentUpload;
use crate::error::{ChatError, GenerationError};
use crate::generation::{GenerationOptions, GenerationRequest, GenerationService};
use crate::repository::ConversationRepository;
use crate::settings::EngineSettings;

pub const STALE_REPLY_WARNING: &str =
    "Editing this message may cause inconsistencies with the AI's response";

/// Knobs of the pipeline, resolved from config and engine settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Trailing prior messages sent as context.
    pub context_window: usize,
    pub request_timeout: Duration,
    /// When false no prior messages are sent at all.
    pub history_enabled: bool,
    pub user_id: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window: 10,
            request_timeout: Duration::from_secs(10),
            history_enabled: true,
            user_id: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(
        conversations: &ConversationConfig,
        backend: &BackendConfig,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            context_window: settings.context_window_or(conversations.context_window),
            request_timeout: backend.request_timeout(),
            history_enabled: settings.history_enabled(),
            user_id: backend.user_id.clone(),
        }
    }
}

/// How a send resolved. Transport failures are outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Replied { user_message: Message, reply: Message },
    /// Generation failed; the user message stays in the conversation.
    Failed { user_message: Message, error: GenerationError },
    /// The conversation was deleted while the reply was pending; the reply
    /// was discarded.
    Abandoned { user_message: Message },
}

impl TurnOutcome {
    pub fn user_message(&self) -> &Message {
        match self {
            TurnOutcome::Replied { user_message, .. }
            | TurnOutcome::Failed { user_message, .. }
            | TurnOutcome::Abandoned { user_message } => user_message,
        }
    }

    pub fn reply(&self) -> Option<&Message> {
        match self {
            TurnOutcome::Replied { reply, .. } => Some(reply),
            _ => None,
        }
    }
}

/// Result of an edit through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub message: Message,
    /// An assistant reply follows the edited message and was generated
    /// against the old text.
    pub reply_may_be_stale: bool,
}

pub struct TurnPipeline {
    repo: Arc<ConversationRepository>,
    generator: Arc<dyn GenerationService>,
    config: PipelineConfig,
    in_flight: Mutex<HashMap<ConversationId, u64>>,
    next_token: AtomicU64,
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight entry and the loading state however the send ends.
struct InFlightGuard<'a> {
    pipeline: &'a TurnPipeline,
    conversation_id: ConversationId,
    token: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        {
            let mut in_flight = self.pipeline.in_flight();
            if in_flight.get(&self.conversation_id) == Some(&self.token) {
                in_flight.remove(&self.conversation_id);
            }
        }
        self.pipeline.repo.events().publish(EngineEvent::LoadingChanged {
            conversation_id: self.conversation_id,
            loading: false,
        });
    }
}

impl TurnPipeline {
    pub fn new(
        repo: Arc<ConversationRepository>,
        generator: Arc<dyn GenerationService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repo,
            generator,
            config,
            in_flight: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    pub fn repository(&self) -> &Arc<ConversationRepository> {
        &self.repo
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<ConversationId, u64>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a reply is pending for the conversation.
    pub fn is_loading(&self, conversation_id: ConversationId) -> bool {
        self.in_flight().contains_key(&conversation_id)
    }

    fn begin(&self, conversation_id: ConversationId) -> Result<InFlightGuard<'_>, ChatError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut in_flight = self.in_flight();
            if in_flight.contains_key(&conversation_id) {
                return Err(ChatError::TurnInFlight(conversation_id));
            }
            in_flight.insert(conversation_id, token);
        }
        self.repo.events().publish(EngineEvent::LoadingChanged {
            conversation_id,
            loading: true,
        });
        Ok(InFlightGuard {
            pipeline: self,
            conversation_id,
            token,
        })
    }

    /// Send a user turn.
    ///
    /// Blank text without uploads is rejected before anything happens. The
    /// user message is appended before generation starts, so it precedes the
    /// reply whatever the latency; if generation fails it stays in place.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        text: &str,
        uploads: Vec<AttachmentUpload>,
    ) -> Result<TurnOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() && uploads.is_empty() {
            self.repo
                .events()
                .error("Please enter a message or attach a file");
            return Err(ChatError::EmptyMessage);
        }
        if !self.repo.contains(conversation_id) {
            return Err(ChatError::ConversationNotFound(conversation_id));
        }
        let _guard = match self.begin(conversation_id) {
            Ok(guard) => guard,
            Err(e) => {
                self.repo
                    .events()
                    .warning("Please wait for the current reply to finish");
                return Err(e);
            }
        };

        let history = if self.config.history_enabled {
            self.repo
                .recent_messages(conversation_id, self.config.context_window)?
        } else {
            Vec::new()
        };

        let registry = self.repo.attachments();
        let attachments: Vec<Attachment> = uploads
            .into_iter()
            .map(|upload| registry.register(conversation_id, upload))
            .collect();
        let handles: Vec<_> = attachments.iter().filter_map(|a| a.locator).collect();
        let user_message = Message::user(text, attachments);
        if let Err(e) = self.repo.append_message(conversation_id, user_message.clone()) {
            registry.release(&handles);
            return Err(e);
        }

        let request = GenerationRequest::new(text, &history).with_options(GenerationOptions {
            user_id: self.config.user_id.clone(),
            ..GenerationOptions::default()
        });
        debug!(
            conversation_id = %conversation_id,
            history = request.history.len(),
            "Requesting generation"
        );
        let result = match tokio::time::timeout(
            self.config.request_timeout,
            self.generator.generate(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.config.request_timeout)),
        };

        let outcome = match result {
            Ok(reply) => {
                let mut assistant = Message::assistant(reply.response);
                assistant.timestamp = Timestamp::now_at_least(user_message.timestamp);
                match self.repo.append_message(conversation_id, assistant.clone()) {
                    Ok(()) => TurnOutcome::Replied {
                        user_message,
                        reply: assistant,
                    },
                    Err(ChatError::ConversationNotFound(_)) => {
                        info!(conversation_id = %conversation_id, "Conversation deleted before its reply arrived, discarding reply");
                        TurnOutcome::Abandoned { user_message }
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(error) => {
                warn!(conversation_id = %conversation_id, error = %error, "Generation failed");
                self.repo
                    .events()
                    .error(format!("Failed to get a response: {}", error));
                TurnOutcome::Failed {
                    user_message,
                    error,
                }
            }
        };

        self.repo.derive_pending_titles();
        Ok(outcome)
    }

    /// Edit a message's text.
    ///
    /// Editing a user message that already has a reply after it only warns;
    /// the reply is neither regenerated nor invalidated.
    pub fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        new_text: &str,
    ) -> Result<EditOutcome, ChatError> {
        let message = self
            .repo
            .edit_message_text(conversation_id, message_id, new_text)?;
        let reply_may_be_stale = message.is_user()
            && self
                .repo
                .conversation(conversation_id)
                .is_some_and(|c| c.has_reply_after(message_id));
        if reply_may_be_stale {
            warn!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                "Edited a message that already has a reply"
            );
            self.repo.events().warning(STALE_REPLY_WARNING);
        }
        Ok(EditOutcome {
            message,
            reply_may_be_stale,
        })
    }
}
