//! Conversation repository.
//!
//! Single owner of the conversation list and the current-selection pointer.
//! Every mutation marks the repository dirty and wakes the debounced writer
//! (see [`crate::persistence`]); in-memory state is the source of truth for
//! the session and is never rolled back because a write failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use companion_core::config::ConversationConfig;
use companion_core::events::{EngineEvent, EventBus};
use companion_core::types::{Conversation, ConversationId, Message, MessageId, Timestamp};
use companion_store::DurableStore;

use crate::attachments::AttachmentRegistry;
use crate::error::ChatError;
use crate::title::derive_title;

#[derive(Debug, Default)]
struct RepositoryState {
    /// Newest first.
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
    /// Conversations whose title should be derived on the next pass.
    pending_titles: Vec<ConversationId>,
}

impl RepositoryState {
    fn find(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn current_id(&self) -> Option<ConversationId> {
        self.current
            .filter(|id| self.find(*id).is_some())
            .or_else(|| self.conversations.first().map(|c| c.id))
    }

    fn derive_titles(&mut self, max_chars: usize) -> Vec<(ConversationId, String)> {
        let pending = std::mem::take(&mut self.pending_titles);
        let mut derived = Vec::new();
        for id in pending {
            let Some(conversation) = self.find_mut(id) else {
                continue;
            };
            if !conversation.has_placeholder_title() || conversation.messages.len() < 2 {
                continue;
            }
            if let Some(text) = conversation.first_user_text() {
                let title = derive_title(text, max_chars);
                conversation.title = title.clone();
                derived.push((id, title));
            }
        }
        derived
    }
}

/// Owns the conversation threads of one client.
pub struct ConversationRepository {
    state: Mutex<RepositoryState>,
    store: DurableStore,
    attachments: Arc<AttachmentRegistry>,
    config: ConversationConfig,
    events: EventBus,
    dirty: AtomicBool,
    changed: Arc<Notify>,
}

impl std::fmt::Debug for ConversationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRepository")
            .field("conversations", &self.len())
            .field("dirty", &self.dirty.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConversationRepository {
    /// An empty repository. Call [`ConversationRepository::initialize`] before use.
    pub fn new(
        store: DurableStore,
        attachments: Arc<AttachmentRegistry>,
        config: ConversationConfig,
    ) -> Self {
        let events = store.events().clone();
        Self {
            state: Mutex::new(RepositoryState::default()),
            store,
            attachments,
            config,
            events,
            dirty: AtomicBool::new(false),
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn attachments(&self) -> &Arc<AttachmentRegistry> {
        &self.attachments
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.changed.notify_one();
    }

    pub(crate) fn change_signal(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load persisted conversations. An absent, empty or corrupt list is
    /// replaced by one conversation seeded with the welcome message.
    ///
    /// Returns the number of conversations afterwards.
    pub fn initialize(&self) -> usize {
        let loaded: Option<Vec<Conversation>> = self.store.load(&self.config.storage_key);
        let mut state = self.lock();
        match loaded.filter(|conversations| !conversations.is_empty()) {
            Some(conversations) => {
                info!(count = conversations.len(), "Conversations restored");
                state.current = conversations.first().map(|c| c.id);
                state.conversations = conversations;
                state.pending_titles.clear();
                state.conversations.len()
            }
            None => {
                let conversation = Conversation::with_welcome(self.config.welcome_message.clone());
                let id = conversation.id;
                state.conversations = vec![conversation];
                state.current = Some(id);
                state.pending_titles.clear();
                drop(state);

                info!(conversation_id = %id, "No saved conversations, seeded a new one");
                self.events
                    .publish(EngineEvent::ConversationCreated { conversation_id: id });
                self.events
                    .publish(EngineEvent::ConversationSelected { conversation_id: id });
                self.mark_dirty();
                1
            }
        }
    }

    // =========================================================================
    // Conversation Operations
    // =========================================================================

    /// Prepend an empty conversation and make it current.
    pub fn create_conversation(&self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id;
        {
            let mut state = self.lock();
            state.conversations.insert(0, conversation);
            state.current = Some(id);
        }
        debug!(conversation_id = %id, "Conversation created");
        self.events
            .publish(EngineEvent::ConversationCreated { conversation_id: id });
        self.events
            .publish(EngineEvent::ConversationSelected { conversation_id: id });
        self.mark_dirty();
        id
    }

    /// Make `id` current. Unknown ids are ignored; returns whether it applied.
    pub fn select_conversation(&self, id: ConversationId) -> bool {
        {
            let mut state = self.lock();
            if state.find(id).is_none() {
                return false;
            }
            state.current = Some(id);
        }
        self.events
            .publish(EngineEvent::ConversationSelected { conversation_id: id });
        true
    }

    /// Remove `id`. Unknown ids are ignored; returns whether it applied.
    ///
    /// If the deleted conversation was current, the new head becomes current.
    /// Deleting the last conversation leaves exactly one fresh conversation.
    /// Attachment blobs owned by the conversation are released.
    pub fn delete_conversation(&self, id: ConversationId) -> bool {
        let (created, selected) = {
            let mut state = self.lock();
            let Some(index) = state.conversations.iter().position(|c| c.id == id) else {
                return false;
            };
            state.conversations.remove(index);
            state.pending_titles.retain(|pending| *pending != id);

            if state.conversations.is_empty() {
                let fresh = Conversation::new();
                let fresh_id = fresh.id;
                state.conversations.push(fresh);
                state.current = Some(fresh_id);
                (Some(fresh_id), Some(fresh_id))
            } else if state.current == Some(id) {
                let head = state.conversations[0].id;
                state.current = Some(head);
                (None, Some(head))
            } else {
                (None, None)
            }
        };

        let released = self.attachments.release_conversation(id);
        debug!(conversation_id = %id, released, "Conversation deleted");
        self.events
            .publish(EngineEvent::ConversationDeleted { conversation_id: id });
        if let Some(created) = created {
            self.events.publish(EngineEvent::ConversationCreated {
                conversation_id: created,
            });
        }
        if let Some(selected) = selected {
            self.events.publish(EngineEvent::ConversationSelected {
                conversation_id: selected,
            });
        }
        self.events.success("Conversation deleted");
        self.mark_dirty();
        true
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Append `message` to the conversation and refresh its activity stamps.
    ///
    /// Title derivation is only queued here; it runs on the next
    /// [`ConversationRepository::derive_pending_titles`] or flush.
    pub fn append_message(&self, conversation_id: ConversationId, message: Message) -> Result<(), ChatError> {
        let message_id = message.id;
        {
            let mut state = self.lock();
            let conversation = state
                .find_mut(conversation_id)
                .ok_or(ChatError::ConversationNotFound(conversation_id))?;
            conversation.messages.push(message);
            conversation.touch();
            let wants_title =
                conversation.has_placeholder_title() && conversation.messages.len() >= 2;
            if wants_title && !state.pending_titles.contains(&conversation_id) {
                state.pending_titles.push(conversation_id);
            }
        }
        self.events.publish(EngineEvent::MessageAppended {
            conversation_id,
            message_id,
        });
        self.mark_dirty();
        Ok(())
    }

    /// Replace the text of a message and refresh its timestamp.
    ///
    /// Blank text is rejected without touching the message. Every outcome is
    /// also reported as a notice.
    pub fn edit_message_text(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        new_text: &str,
    ) -> Result<Message, ChatError> {
        let text = new_text.trim();
        if text.is_empty() {
            self.events.error("Message cannot be empty");
            return Err(ChatError::EmptyEdit);
        }

        let updated = {
            let mut state = self.lock();
            let Some(conversation) = state.find_mut(conversation_id) else {
                drop(state);
                warn!(conversation_id = %conversation_id, "Edit of a message in an unknown conversation");
                self.events.error("Failed to update message");
                return Err(ChatError::ConversationNotFound(conversation_id));
            };
            let Some(message) = conversation.messages.iter_mut().find(|m| m.id == message_id) else {
                drop(state);
                warn!(message_id = %message_id, "Edit of an unknown message");
                self.events.error("Failed to update message");
                return Err(ChatError::MessageNotFound(message_id));
            };
            message.text = text.to_string();
            message.timestamp = Timestamp::now_at_least(message.timestamp);
            let updated = message.clone();
            conversation.touch();
            updated
        };

        self.events.publish(EngineEvent::MessageEdited {
            conversation_id,
            message_id,
        });
        self.events.success("Message updated successfully");
        self.mark_dirty();
        Ok(updated)
    }

    /// Run queued title derivations. Already-titled conversations are left
    /// untouched, so running this again is a no-op.
    pub fn derive_pending_titles(&self) -> Vec<(ConversationId, String)> {
        let derived = self.lock().derive_titles(self.config.title_max_chars);
        if !derived.is_empty() {
            self.publish_titles(&derived);
            self.mark_dirty();
        }
        derived
    }

    fn publish_titles(&self, derived: &[(ConversationId, String)]) {
        for (id, title) in derived {
            debug!(conversation_id = %id, title = %title, "Title derived");
            self.events.publish(EngineEvent::TitleDerived {
                conversation_id: *id,
                title: title.clone(),
            });
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().find(id).cloned()
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.lock().find(id).is_some()
    }

    /// The current conversation id, falling back to the head of the list when
    /// the stored pointer is stale.
    pub fn current_id(&self) -> Option<ConversationId> {
        self.lock().current_id()
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        let state = self.lock();
        state.current_id().and_then(|id| state.find(id).cloned())
    }

    /// The last `window` messages of a conversation, oldest first.
    pub fn recent_messages(&self, id: ConversationId, window: usize) -> Result<Vec<Message>, ChatError> {
        let state = self.lock();
        let conversation = state.find(id).ok_or(ChatError::ConversationNotFound(id))?;
        let skip = conversation.messages.len().saturating_sub(window);
        Ok(conversation.messages[skip..].to_vec())
    }

    pub fn len(&self) -> usize {
        self.lock().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().conversations.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the newest `max_conversations` conversations to the store now.
    ///
    /// Pending titles are derived first so the written list carries them.
    /// Returns whether the write landed; failures are already reported.
    pub fn flush(&self) -> bool {
        let (snapshot, derived) = {
            let mut state = self.lock();
            // Cleared under the lock so a later mutation re-marks it.
            self.dirty.store(false, Ordering::SeqCst);
            let derived = state.derive_titles(self.config.title_max_chars);
            let snapshot: Vec<Conversation> = state
                .conversations
                .iter()
                .take(self.config.max_conversations)
                .cloned()
                .collect();
            (snapshot, derived)
        };
        self.publish_titles(&derived);

        let count = snapshot.len();
        let written = self.store.save(&self.config.storage_key, &snapshot);
        if written {
            debug!(count, "Conversations persisted");
            self.events.publish(EngineEvent::Persisted { count });
        } else {
            warn!(count, "Conversations could not be persisted");
        }
        written
    }

    /// Flush only if a mutation happened since the last flush.
    pub fn flush_if_dirty(&self) -> bool {
        if self.is_dirty() {
            self.flush()
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::events::{drain, notices};
    use companion_core::types::{NEW_CHAT_TITLE, Sender};
    use companion_core::NoticeLevel;
    use companion_store::{KeyValueStore, MemoryStore};

    use crate::attachments::AttachmentUpload;

    fn make_repo_with(backend: Arc<MemoryStore>) -> ConversationRepository {
        let store = DurableStore::new(backend, EventBus::new(256));
        ConversationRepository::new(
            store,
            Arc::new(AttachmentRegistry::new()),
            ConversationConfig::default(),
        )
    }

    fn make_repo() -> (Arc<MemoryStore>, ConversationRepository) {
        let backend = Arc::new(MemoryStore::new());
        let repo = make_repo_with(backend.clone());
        repo.initialize();
        (backend, repo)
    }

    fn stored(backend: &MemoryStore) -> Vec<Conversation> {
        let raw = backend.get("alu_chat_conversations").unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    // ---- Initialization ----

    #[test]
    fn test_initialize_seeds_welcome_conversation() {
        let (_, repo) = make_repo();
        assert_eq!(repo.len(), 1);
        let current = repo.current_conversation().unwrap();
        assert_eq!(current.title, NEW_CHAT_TITLE);
        assert_eq!(current.messages.len(), 1);
        assert_eq!(current.messages[0].sender, Sender::Assistant);
        assert!(current.messages[0].text.starts_with("# Welcome to ALU Student Companion"));
        assert!(repo.is_dirty());
    }

    #[test]
    fn test_initialize_restores_saved_list() {
        let backend = Arc::new(MemoryStore::new());
        let first = Conversation::new();
        let second = Conversation::new();
        backend
            .set(
                "alu_chat_conversations",
                &serde_json::to_string(&vec![first.clone(), second]).unwrap(),
            )
            .unwrap();

        let repo = make_repo_with(backend);
        assert_eq!(repo.initialize(), 2);
        assert_eq!(repo.current_id(), Some(first.id));
        assert!(!repo.is_dirty());
    }

    #[test]
    fn test_initialize_treats_corrupt_list_as_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("alu_chat_conversations", "{{{").unwrap();
        let repo = make_repo_with(backend);
        let mut rx = repo.events().subscribe();

        assert_eq!(repo.initialize(), 1);
        assert_eq!(repo.current_conversation().unwrap().messages.len(), 1);
        assert_eq!(notices(&drain(&mut rx), NoticeLevel::Error).len(), 1);
    }

    #[test]
    fn test_initialize_treats_empty_list_as_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("alu_chat_conversations", "[]").unwrap();
        let repo = make_repo_with(backend);
        assert_eq!(repo.initialize(), 1);
    }

    // ---- Create / Select / Delete ----

    #[test]
    fn test_create_prepends_and_selects() {
        let (_, repo) = make_repo();
        let id = repo.create_conversation();
        let conversations = repo.conversations();
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].id, id);
        assert!(conversations[0].messages.is_empty());
        assert_eq!(repo.current_id(), Some(id));
    }

    #[test]
    fn test_select_unknown_is_noop() {
        let (_, repo) = make_repo();
        let before = repo.current_id();
        assert!(!repo.select_conversation(ConversationId::new()));
        assert_eq!(repo.current_id(), before);
    }

    #[test]
    fn test_select_existing() {
        let (_, repo) = make_repo();
        let seeded = repo.current_id().unwrap();
        repo.create_conversation();
        assert!(repo.select_conversation(seeded));
        assert_eq!(repo.current_id(), Some(seeded));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let (_, repo) = make_repo();
        let mut rx = repo.events().subscribe();
        assert!(!repo.delete_conversation(ConversationId::new()));
        assert_eq!(repo.len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_delete_last_leaves_one_fresh_conversation() {
        let (_, repo) = make_repo();
        let only = repo.current_id().unwrap();
        assert!(repo.delete_conversation(only));

        let conversations = repo.conversations();
        assert_eq!(conversations.len(), 1);
        assert_ne!(conversations[0].id, only);
        assert!(conversations[0].messages.is_empty());
        assert_eq!(repo.current_id(), Some(conversations[0].id));
    }

    #[test]
    fn test_delete_current_selects_new_head() {
        let (_, repo) = make_repo();
        let seeded = repo.current_id().unwrap();
        let second = repo.create_conversation();
        let third = repo.create_conversation();

        repo.select_conversation(second);
        repo.delete_conversation(second);
        assert_eq!(repo.current_id(), Some(third));

        repo.delete_conversation(seeded);
        assert_eq!(repo.current_id(), Some(third));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_delete_releases_attachments() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        let attachment = repo
            .attachments()
            .register(id, AttachmentUpload::new("a.png", "image/png", vec![1]));
        repo.append_message(id, Message::user("", vec![attachment])).unwrap();
        assert_eq!(repo.attachments().live_count(), 1);

        repo.delete_conversation(id);
        assert_eq!(repo.attachments().live_count(), 0);
    }

    // ---- Messages and titles ----

    #[test]
    fn test_append_to_unknown_conversation_fails() {
        let (_, repo) = make_repo();
        let missing = ConversationId::new();
        let err = repo.append_message(missing, Message::user("hi", vec![])).unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound(id) if id == missing));
    }

    #[test]
    fn test_title_is_deferred_then_idempotent() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        repo.append_message(id, Message::user("What are the library hours?", vec![]))
            .unwrap();
        assert_eq!(repo.conversation(id).unwrap().title, NEW_CHAT_TITLE);

        let derived = repo.derive_pending_titles();
        assert_eq!(derived, vec![(id, "What are the library hour...".to_string())]);

        repo.append_message(id, Message::user("Something else entirely", vec![]))
            .unwrap();
        assert!(repo.derive_pending_titles().is_empty());
        assert_eq!(repo.conversation(id).unwrap().title, "What are the library hour...");
    }

    #[test]
    fn test_title_waits_for_user_text() {
        let (_, repo) = make_repo();
        let id = repo.create_conversation();
        repo.append_message(id, Message::assistant("hello")).unwrap();
        repo.append_message(id, Message::user("", vec![])).unwrap();
        assert!(repo.derive_pending_titles().is_empty());

        repo.append_message(id, Message::user("Fees", vec![])).unwrap();
        assert_eq!(repo.derive_pending_titles(), vec![(id, "Fees".to_string())]);
    }

    #[test]
    fn test_recent_messages_window() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        for i in 0..12 {
            repo.append_message(id, Message::user(format!("m{}", i), vec![]))
                .unwrap();
        }
        let recent = repo.recent_messages(id, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(recent[9].text, "m11");
        assert_eq!(repo.recent_messages(id, 100).unwrap().len(), 13);
        assert!(repo.recent_messages(id, 0).unwrap().is_empty());
    }

    #[test]
    fn test_edit_rejects_blank_text() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        let message = Message::user("original", vec![]);
        let message_id = message.id;
        repo.append_message(id, message).unwrap();
        let mut rx = repo.events().subscribe();

        let err = repo.edit_message_text(id, message_id, "   ").unwrap_err();
        assert!(matches!(err, ChatError::EmptyEdit));
        assert_eq!(repo.conversation(id).unwrap().message(message_id).unwrap().text, "original");
        assert_eq!(
            notices(&drain(&mut rx), NoticeLevel::Error),
            vec!["Message cannot be empty"]
        );
    }

    #[test]
    fn test_edit_replaces_text_and_refreshes_timestamp() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        let mut message = Message::user("original", vec![]);
        message.timestamp = Timestamp(1);
        let message_id = message.id;
        repo.append_message(id, message).unwrap();
        let mut rx = repo.events().subscribe();

        let updated = repo.edit_message_text(id, message_id, " revised ").unwrap();
        assert_eq!(updated.text, "revised");
        assert!(updated.timestamp > Timestamp(1));
        assert_eq!(updated.sender, Sender::User);

        let events = drain(&mut rx);
        assert!(events.contains(&EngineEvent::MessageEdited {
            conversation_id: id,
            message_id
        }));
        assert_eq!(
            notices(&events, NoticeLevel::Success),
            vec!["Message updated successfully"]
        );
    }

    #[test]
    fn test_edit_unknown_message_reports_failure() {
        let (_, repo) = make_repo();
        let id = repo.current_id().unwrap();
        let mut rx = repo.events().subscribe();
        let err = repo.edit_message_text(id, MessageId::new(), "x").unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound(_)));
        assert_eq!(notices(&drain(&mut rx), NoticeLevel::Error).len(), 1);
    }

    // ---- Persistence ----

    #[test]
    fn test_flush_is_bounded() {
        let (backend, repo) = make_repo();
        for _ in 0..60 {
            repo.create_conversation();
        }
        assert!(repo.flush());
        assert_eq!(repo.len(), 61);
        let saved = stored(&backend);
        assert_eq!(saved.len(), 50);
        assert_eq!(saved[0].id, repo.conversations()[0].id);
        assert!(!repo.is_dirty());
    }

    #[test]
    fn test_flush_carries_pending_titles() {
        let (backend, repo) = make_repo();
        let id = repo.current_id().unwrap();
        repo.append_message(id, Message::user("Hi", vec![])).unwrap();
        repo.flush();
        assert_eq!(stored(&backend)[0].title, "Hi");
        assert!(!repo.is_dirty());
    }

    #[test]
    fn test_flush_failure_keeps_memory_state() {
        let (backend, repo) = make_repo();
        backend.set_offline(true);
        let mut rx = repo.events().subscribe();

        repo.create_conversation();
        assert!(!repo.flush());
        assert_eq!(repo.len(), 2);
        assert_eq!(notices(&drain(&mut rx), NoticeLevel::Warning).len(), 1);
    }

    #[test]
    fn test_flush_if_dirty_skips_clean_repository() {
        let (backend, repo) = make_repo();
        repo.flush();
        backend.remove("alu_chat_conversations").unwrap();
        assert!(repo.flush_if_dirty());
        assert!(backend.get("alu_chat_conversations").unwrap().is_none());
    }

    /// Creates one conversation from inside the first write it sees.
    struct InterleavingStore {
        inner: MemoryStore,
        repo: std::sync::OnceLock<std::sync::Weak<ConversationRepository>>,
        fired: AtomicBool,
    }

    impl KeyValueStore for InterleavingStore {
        fn get(&self, key: &str) -> Result<Option<String>, companion_store::StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), companion_store::StoreError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                if let Some(repo) = self.repo.get().and_then(|weak| weak.upgrade()) {
                    repo.create_conversation();
                }
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), companion_store::StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_mutation_during_write_stays_dirty() {
        let backend = Arc::new(InterleavingStore {
            inner: MemoryStore::new(),
            repo: std::sync::OnceLock::new(),
            fired: AtomicBool::new(false),
        });
        let repo = Arc::new(ConversationRepository::new(
            DurableStore::new(backend.clone(), EventBus::new(256)),
            Arc::new(AttachmentRegistry::new()),
            ConversationConfig::default(),
        ));
        backend.repo.set(Arc::downgrade(&repo)).unwrap();
        repo.initialize();

        assert!(repo.flush());
        assert_eq!(repo.len(), 2);
        assert_eq!(stored(&backend.inner).len(), 1);
        assert!(repo.is_dirty());

        assert!(repo.flush_if_dirty());
        assert_eq!(stored(&backend.inner).len(), 2);
        assert!(!repo.is_dirty());
    }

    #[test]
    fn test_attachment_locators_are_not_persisted() {
        let (backend, repo) = make_repo();
        let id = repo.current_id().unwrap();
        let attachment = repo
            .attachments()
            .register(id, AttachmentUpload::new("notes.pdf", "application/pdf", vec![9]));
        repo.append_message(id, Message::user("see file", vec![attachment]))
            .unwrap();
        repo.flush();

        let saved = stored(&backend);
        let restored = &saved[0].messages[1].attachments[0];
        assert_eq!(restored.name, "notes.pdf");
        assert!(restored.locator.is_none());
    }
}
