use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder title of a conversation whose title has not been derived yet.
pub const NEW_CHAT_TITLE: &str = "New Chat";

// =============================================================================
// Enums
// =============================================================================

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Role name used on the generation wire format.
    pub fn role(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role())
    }
}

/// Kind of a user-supplied attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    /// Classify by MIME type: `image/*` is an image, everything else a file.
    pub fn from_mime(mime: &str) -> Self {
        if mime.trim().to_ascii_lowercase().starts_with("image/") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        }
    }
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Unique identifier for a conversation thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a feedback entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackId(pub Uuid);

impl FeedbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedbackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-local handle to an attachment blob.
///
/// Handles are only meaningful inside the process that issued them and are
/// never written to the durable store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentHandle(pub u64);

impl fmt::Display for AttachmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in milliseconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// The current time, but never earlier than `floor`.
    pub fn now_at_least(floor: Timestamp) -> Self {
        Self::now().max(floor)
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A file or image attached to a user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    /// Dereferenceable handle; absent once the issuing session has ended.
    #[serde(skip)]
    pub locator: Option<AttachmentHandle>,
}

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::User,
            timestamp: Timestamp::now(),
            attachments,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::Assistant,
            timestamp: Timestamp::now(),
            attachments: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// A persisted conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Freshness key used for ordering.
    pub last_activity_timestamp: Timestamp,
}

impl Conversation {
    /// An empty conversation carrying the placeholder title.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: NEW_CHAT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            last_activity_timestamp: Timestamp::from_datetime(now),
        }
    }

    /// A conversation seeded with one assistant welcome message.
    pub fn with_welcome(text: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.messages.push(Message::assistant(text));
        conversation
    }

    pub fn has_placeholder_title(&self) -> bool {
        self.title == NEW_CHAT_TITLE
    }

    /// Refresh `updated_at` and the activity key without ever moving them backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.last_activity_timestamp = Timestamp::now_at_least(self.last_activity_timestamp);
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// First user-authored message with non-blank text.
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.text.trim())
            .find(|t| !t.is_empty())
    }

    /// Whether an assistant message appears after the message `id`.
    pub fn has_reply_after(&self, id: MessageId) -> bool {
        match self.messages.iter().position(|m| m.id == id) {
            Some(index) => self.messages[index + 1..]
                .iter()
                .any(|m| m.sender == Sender::Assistant),
            None => false,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Persona
// =============================================================================

/// Trait weights (0-100) shaping the assistant's voice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTraits {
    pub helpfulness: u8,
    pub creativity: u8,
    pub precision: u8,
    pub friendliness: u8,
}

impl Default for PersonaTraits {
    fn default() -> Self {
        Self {
            helpfulness: 75,
            creativity: 50,
            precision: 85,
            friendliness: 70,
        }
    }
}

/// Named persona presets selectable in settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaPreset {
    #[default]
    Academic,
    Creative,
    Technical,
    Supportive,
    Nyptho,
    Custom,
}

impl PersonaPreset {
    pub fn display_name(&self) -> &'static str {
        match self {
            PersonaPreset::Academic => "Academic Advisor",
            PersonaPreset::Creative => "Creative Coach",
            PersonaPreset::Technical => "Technical Assistant",
            PersonaPreset::Supportive => "Supportive Guide",
            PersonaPreset::Nyptho => "Nyptho Learning AI",
            PersonaPreset::Custom => "Custom AI",
        }
    }

    /// Parse a settings key. Unknown keys fall back to the academic preset.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "creative" => PersonaPreset::Creative,
            "technical" => PersonaPreset::Technical,
            "supportive" => PersonaPreset::Supportive,
            "nyptho" => PersonaPreset::Nyptho,
            "custom" => PersonaPreset::Custom,
            _ => PersonaPreset::Academic,
        }
    }

    /// The learning-model preset routes generation through the learning backend.
    pub fn uses_learning_model(&self) -> bool {
        matches!(self, PersonaPreset::Nyptho)
    }
}

/// Persona injected into widget generation requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub traits: PersonaTraits,
}

impl Persona {
    pub fn from_preset(preset: PersonaPreset, traits: PersonaTraits) -> Self {
        Self {
            name: preset.display_name().to_string(),
            traits,
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::from_preset(PersonaPreset::Academic, PersonaTraits::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
