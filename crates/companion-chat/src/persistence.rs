//! Debounced writer for the conversation repository.
//!
//! Mutations wake the writer; it waits for a quiet period of
//! `persist_debounce_ms` with no further mutations and then writes the list
//! once. Shutting down flushes whatever is still pending.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::repository::ConversationRepository;

/// Handle to the background writer task.
#[derive(Debug)]
pub struct PersistenceHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PersistenceHandle {
    /// Spawn the writer for `repo`. The task holds only a weak reference and
    /// exits on its own once the repository is dropped.
    pub fn spawn(repo: &Arc<ConversationRepository>) -> Self {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run(
            Arc::downgrade(repo),
            repo.change_signal(),
            shutdown.clone(),
            repo.config().persist_debounce(),
        ));
        Self { shutdown, task }
    }

    /// Stop the writer after a final flush of pending changes.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.task.await;
    }
}

async fn run(
    repo: Weak<ConversationRepository>,
    changed: Arc<Notify>,
    shutdown: Arc<Notify>,
    quiet_period: Duration,
) {
    loop {
        tokio::select! {
            _ = changed.notified() => {}
            _ = shutdown.notified() => {
                final_flush(&repo).await;
                return;
            }
        }

        // Restart the quiet period on every further change.
        loop {
            let quiet = tokio::select! {
                _ = changed.notified() => false,
                _ = tokio::time::sleep(quiet_period) => true,
                _ = shutdown.notified() => {
                    final_flush(&repo).await;
                    return;
                }
            };
            if quiet {
                break;
            }
        }

        match repo.upgrade() {
            Some(repo) => flush_blocking(repo).await,
            None => return,
        }
    }
}

async fn final_flush(repo: &Weak<ConversationRepository>) {
    if let Some(repo) = repo.upgrade() {
        debug!("Persisting pending conversations before shutdown");
        flush_blocking(repo).await;
    }
}

/// Store writes are synchronous file I/O; keep them off the runtime workers.
async fn flush_blocking(repo: Arc<ConversationRepository>) {
    if let Err(e) = tokio::task::spawn_blocking(move || repo.flush_if_dirty()).await {
        warn!(error = %e, "Conversation flush task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use companion_core::config::ConversationConfig;
    use companion_core::events::EventBus;
    use companion_core::types::Message;
    use companion_store::{DurableStore, KeyValueStore, MemoryStore, StoreError};

    use crate::attachments::AttachmentRegistry;

    /// Memory store that counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn make_repo() -> (Arc<CountingStore>, Arc<ConversationRepository>) {
        let backend = Arc::new(CountingStore::default());
        let store = DurableStore::new(backend.clone(), EventBus::new(256));
        let repo = Arc::new(ConversationRepository::new(
            store,
            Arc::new(AttachmentRegistry::new()),
            ConversationConfig::default(),
        ));
        repo.initialize();
        repo.flush();
        backend.writes.store(0, Ordering::SeqCst);
        (backend, repo)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_is_written_once() {
        let (backend, repo) = make_repo();
        let handle = PersistenceHandle::spawn(&repo);

        for _ in 0..5 {
            repo.create_conversation();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert!(!repo.is_dirty());

        handle.shutdown().await;
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_are_written_separately() {
        let (backend, repo) = make_repo();
        let handle = PersistenceHandle::spawn(&repo);
        let id = repo.current_id().unwrap();

        repo.append_message(id, Message::user("first", vec![])).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        repo.append_message(id, Message::user("second", vec![])).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_changes() {
        let (backend, repo) = make_repo();
        let handle = PersistenceHandle::spawn(&repo);
        tokio::task::yield_now().await;

        repo.create_conversation();
        handle.shutdown().await;

        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        let saved = backend.inner.get("alu_chat_conversations").unwrap().unwrap();
        let saved: Vec<companion_core::Conversation> = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved.len(), 2);
    }

    /// Records the thread each write runs on.
    #[derive(Default)]
    struct ThreadRecordingStore {
        inner: MemoryStore,
        writers: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl KeyValueStore for ThreadRecordingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writers.lock().unwrap().push(std::thread::current().id());
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_run_off_the_runtime_thread() {
        let backend = Arc::new(ThreadRecordingStore::default());
        let repo = Arc::new(ConversationRepository::new(
            DurableStore::new(backend.clone(), EventBus::new(256)),
            Arc::new(AttachmentRegistry::new()),
            ConversationConfig::default(),
        ));
        repo.initialize();
        let handle = PersistenceHandle::spawn(&repo);

        repo.create_conversation();
        tokio::time::sleep(Duration::from_secs(1)).await;
        repo.create_conversation();
        handle.shutdown().await;

        let runtime_thread = std::thread::current().id();
        let writers = backend.writers.lock().unwrap();
        assert_eq!(writers.len(), 2);
        assert!(writers.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_exits_when_repository_is_dropped() {
        let (_, repo) = make_repo();
        let handle = PersistenceHandle::spawn(&repo);
        repo.create_conversation();
        drop(repo);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.task.is_finished());
    }
}
