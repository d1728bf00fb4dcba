//! Session-scoped attachment blobs.
//!
//! Uploaded bytes live here, keyed by an [`AttachmentHandle`]. Messages carry
//! only the handle, which is dropped when conversations are persisted. Blobs
//! are released when their owning conversation is deleted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use companion_core::types::{Attachment, AttachmentHandle, AttachmentKind, ConversationId};

/// A file handed to the engine alongside a user turn.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }
}

struct Blob {
    owner: ConversationId,
    bytes: Arc<[u8]>,
}

/// Registry of live attachment blobs.
#[derive(Default)]
pub struct AttachmentRegistry {
    next_handle: AtomicU64,
    blobs: Mutex<HashMap<AttachmentHandle, Blob>>,
}

impl std::fmt::Debug for AttachmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<AttachmentHandle, Blob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the upload's bytes and return the attachment descriptor for it.
    pub fn register(&self, owner: ConversationId, upload: AttachmentUpload) -> Attachment {
        let handle = AttachmentHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let kind = AttachmentKind::from_mime(&upload.mime);
        self.blobs().insert(
            handle,
            Blob {
                owner,
                bytes: upload.bytes.into(),
            },
        );
        debug!(%handle, name = %upload.name, ?kind, "Attachment registered");
        Attachment {
            kind,
            name: upload.name,
            locator: Some(handle),
        }
    }

    /// Bytes behind `handle`, if it is still live.
    pub fn resolve(&self, handle: AttachmentHandle) -> Option<Arc<[u8]>> {
        self.blobs().get(&handle).map(|b| b.bytes.clone())
    }

    /// Release specific handles.
    pub fn release(&self, handles: &[AttachmentHandle]) {
        let mut blobs = self.blobs();
        for handle in handles {
            blobs.remove(handle);
        }
    }

    /// Release every blob owned by `owner`. Returns how many were released.
    pub fn release_conversation(&self, owner: ConversationId) -> usize {
        let mut blobs = self.blobs();
        let before = blobs.len();
        blobs.retain(|_, blob| blob.owner != owner);
        let released = before - blobs.len();
        if released > 0 {
            debug!(conversation_id = %owner, released, "Attachments released");
        }
        released
    }

    pub fn live_count(&self) -> usize {
        self.blobs().len()
    }
}
