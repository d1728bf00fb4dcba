use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ConversationId, MessageId};

/// Severity of a user-visible notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// State changes published by the engine for the rendering layer.
///
/// Consumers subscribe through [`EventBus::subscribe`]; the engine never
/// waits on them and never fails because nobody is listening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EngineEvent {
    // =========================================================================
    // Conversation Events
    // =========================================================================
    ConversationCreated {
        conversation_id: ConversationId,
    },

    ConversationSelected {
        conversation_id: ConversationId,
    },

    ConversationDeleted {
        conversation_id: ConversationId,
    },

    MessageAppended {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    TitleDerived {
        conversation_id: ConversationId,
        title: String,
    },

    /// A generation request for the conversation started or finished.
    LoadingChanged {
        conversation_id: ConversationId,
        loading: bool,
    },

    /// The conversation list was written to the durable store.
    Persisted {
        count: usize,
    },

    // =========================================================================
    // Dialogue Events
    // =========================================================================
    StageChanged {
        from: String,
        to: String,
    },

    // =========================================================================
    // Notices
    // =========================================================================
    /// A toast-style message for the user.
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

/// Broadcast channel carrying [`EngineEvent`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(EngineEvent::Notice {
            level,
            message: message.into(),
        });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Error, message);
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Messages of every notice with the given level.
pub fn notices(events: &[EngineEvent], level: NoticeLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Notice { level: l, message } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}
