//! Generation service contract.
//!
//! The engine treats natural-language generation as an opaque remote call:
//! one user turn plus trailing history in, one reply string out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use companion_core::types::{Message, Persona, Sender};

use crate::error::GenerationError;

/// One prior message sent as context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Sender,
    pub content: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.sender,
            content: message.text.clone(),
        }
    }
}

/// Optional request modifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Identity tag of the signed-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Persona voice, used by the guided-assistance widget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<Persona>,
    /// Route the turn through the learning model.
    #[serde(
        rename = "useNyptho",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub use_learning_model: bool,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.personality.is_none() && !self.use_learning_model
    }
}

/// Request body of the chat endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub message: String,
    pub history: Vec<HistoryTurn>,
    #[serde(default, skip_serializing_if = "GenerationOptions::is_empty")]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new<'a>(message: impl Into<String>, history: impl IntoIterator<Item = &'a Message>) -> Self {
        Self {
            message: message.into(),
            history: history.into_iter().map(HistoryTurn::from).collect(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Response body of the chat endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReply {
    pub response: String,
}

/// A stateless turn generator.
///
/// Any failure, including a non-success HTTP status, is an error; an empty
/// reply is never used to signal failure.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::types::PersonaTraits;

    #[test]
    fn test_request_wire_shape_without_options() {
        let history = vec![Message::assistant("Welcome"), Message::user("Hi", vec![])];
        let request = GenerationRequest::new("How do I enrol?", &history);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"], "How do I enrol?");
        assert_eq!(json["history"][0]["role"], "assistant");
        assert_eq!(json["history"][1]["role"], "user");
        assert_eq!(json["history"][1]["content"], "Hi");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_request_wire_shape_with_persona() {
        let request = GenerationRequest::new("hello", std::iter::empty()).with_options(GenerationOptions {
            user_id: Some("u-42".to_string()),
            personality: Some(Persona::default()),
            use_learning_model: true,
        });

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["options"]["user_id"], "u-42");
        assert_eq!(json["options"]["personality"]["name"], "Academic Advisor");
        assert_eq!(
            json["options"]["personality"]["traits"]["precision"],
            PersonaTraits::default().precision
        );
        assert_eq!(json["options"]["useNyptho"], true);
    }

    #[test]
    fn test_reply_requires_response_field() {
        let ok: GenerationReply = serde_json::from_str(r#"{"response":"Hello!"}"#).unwrap();
        assert_eq!(ok.response, "Hello!");
        assert!(serde_json::from_str::<GenerationReply>(r#"{"answer":"x"}"#).is_err());
    }
}
