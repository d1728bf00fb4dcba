//! Ratings on assistant replies.
//!
//! Every rating is appended to the `FEEDBACK` list in the store, and the share
//! of positive ratings is written back into the analytics document as
//! `userSatisfaction` (a percentage). Other analytics fields are left as found.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use companion_core::events::EventBus;
use companion_core::types::{ConversationId, FeedbackId, MessageId, Timestamp};
use companion_store::DurableStore;

use crate::error::ChatError;
use crate::repository::ConversationRepository;
use crate::settings::{keys, EngineSettings};

pub const THANKS_MESSAGE: &str = "Thank you for your feedback!";
pub const FAILED_MESSAGE: &str = "Failed to submit feedback";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Positive,
    Negative,
}

/// One stored rating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub id: FeedbackId,
    #[serde(rename = "type")]
    pub rating: FeedbackRating,
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    /// The user message the rated reply answered, if there was one.
    #[serde(default)]
    pub user_query: String,
    /// Text of the rated reply.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: Timestamp,
}

/// Positive share of `entries` as a percentage; zero when there are none.
pub fn satisfaction(entries: &[FeedbackEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let positive = entries
        .iter()
        .filter(|e| e.rating == FeedbackRating::Positive)
        .count();
    positive as f64 / entries.len() as f64 * 100.0
}

/// Records ratings into the durable store.
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    store: DurableStore,
    collect: bool,
    detailed_negative: bool,
}

impl FeedbackLog {
    pub fn new(store: DurableStore, settings: &EngineSettings) -> Self {
        Self {
            store,
            collect: settings.collect_feedback,
            detailed_negative: settings.detailed_negative_feedback,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.collect
    }

    /// Whether a negative rating asks for details.
    pub fn wants_details(&self, rating: FeedbackRating) -> bool {
        rating == FeedbackRating::Negative && self.detailed_negative
    }

    fn events(&self) -> &EventBus {
        self.store.events()
    }

    /// Stored ratings, oldest first.
    pub fn entries(&self) -> Vec<FeedbackEntry> {
        self.store
            .load::<Vec<FeedbackEntry>>(keys::FEEDBACK)
            .unwrap_or_default()
    }

    /// Rate assistant reply `message_id` in `conversation_id`.
    ///
    /// Details are kept only for negative ratings while detailed negative
    /// feedback is on. Each reply can be rated once.
    pub fn record(
        &self,
        repo: &ConversationRepository,
        conversation_id: ConversationId,
        message_id: MessageId,
        rating: FeedbackRating,
        details: Option<&str>,
    ) -> Result<FeedbackEntry, ChatError> {
        if !self.collect {
            return Err(ChatError::FeedbackDisabled);
        }
        let conversation = repo
            .conversation(conversation_id)
            .ok_or(ChatError::ConversationNotFound(conversation_id))?;
        let position = conversation
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(ChatError::MessageNotFound(message_id))?;
        let reply = &conversation.messages[position];
        if reply.is_user() {
            return Err(ChatError::NotAnAssistantReply(message_id));
        }

        let mut entries = self.entries();
        if entries.iter().any(|e| e.message_id == message_id) {
            return Err(ChatError::AlreadyRated(message_id));
        }

        let user_query = conversation.messages[..position]
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.text.clone())
            .unwrap_or_default();
        let details = details
            .map(str::trim)
            .filter(|d| !d.is_empty() && self.wants_details(rating))
            .map(str::to_string);

        let entry = FeedbackEntry {
            id: FeedbackId::new(),
            rating,
            message_id,
            conversation_id,
            user_query,
            message: reply.text.clone(),
            details,
            timestamp: Timestamp::now(),
        };
        entries.push(entry.clone());

        if !self.store.save(keys::FEEDBACK, &entries) {
            self.events().error(FAILED_MESSAGE);
            return Err(ChatError::Storage("feedback could not be saved".to_string()));
        }
        let ratio = satisfaction(&entries);
        self.update_analytics(ratio);

        debug!(
            message_id = %message_id,
            rating = ?rating,
            satisfaction = ratio,
            "Feedback recorded"
        );
        self.events().success(THANKS_MESSAGE);
        Ok(entry)
    }

    fn update_analytics(&self, ratio: f64) {
        let mut analytics = self
            .store
            .load::<Map<String, Value>>(keys::ANALYTICS)
            .unwrap_or_default();
        analytics.insert("userSatisfaction".to_string(), Value::from(ratio));
        if !self.store.save(keys::ANALYTICS, &analytics) {
            warn!("Satisfaction rate could not be updated");
        }
    }
}
