//! Persistence bridge: mirrors the session store into a storage slot.
//!
//! The bridge is the only component holding the live [`SessionStore`]. Every
//! mutation goes through [`PersistenceBridge::mutate`], which applies the
//! change under the lock and then mirrors the resulting log into the
//! conversation repository, so persisted state can trail the live log by at
//! most one mutation. Empty logs are never written.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;

use super::context::ContextRef;
use super::message::ChatMessage;
use super::repository::ConversationRepository;
use super::store::SessionStore;

/// Owns the session store and keeps its persisted mirror in sync.
pub struct PersistenceBridge {
    store: Mutex<SessionStore>,
    repository: Arc<dyn ConversationRepository>,
}

impl PersistenceBridge {
    /// Wraps an existing store. Prefer [`PersistenceBridge::open`] for the
    /// restore-or-create flow.
    pub fn new(store: SessionStore, repository: Arc<dyn ConversationRepository>) -> Self {
        Self {
            store: Mutex::new(store),
            repository,
        }
    }

    /// Opens the conversation for `context`: restores the persisted log when
    /// one exists, otherwise starts empty. The session id is fresh either way.
    pub async fn open(context: ContextRef, repository: Arc<dyn ConversationRepository>) -> Self {
        let messages = repository.restore(&context.storage_key()).await;
        if !messages.is_empty() {
            tracing::debug!(
                key = %context.storage_key(),
                count = messages.len(),
                "restored persisted conversation"
            );
        }
        Self::new(SessionStore::restore(context, messages), repository)
    }

    /// Applies a mutation to the store, then mirrors the log to storage.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut SessionStore) -> T) -> T {
        let (out, key, snapshot) = {
            let mut store = self.store.lock().await;
            let out = f(&mut store);
            (out, store.storage_key(), store.messages().to_vec())
        };

        if !snapshot.is_empty() {
            if let Err(err) = self.repository.save(&key, &snapshot).await {
                tracing::warn!(%key, %err, "failed to mirror conversation to storage");
            }
        }
        out
    }

    /// Reads from the store without persisting.
    pub async fn read<T>(&self, f: impl FnOnce(&SessionStore) -> T) -> T {
        let store = self.store.lock().await;
        f(&store)
    }

    /// Snapshot of the current message log, for rendering.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.read(|s| s.messages().to_vec()).await
    }

    /// Re-runs restoration, for when the hosting view regains visibility.
    ///
    /// The slot may have been written by another view instance in the same
    /// browser context, so restoration is not a mount-only concern. Skipped
    /// while a turn is streaming.
    pub async fn on_resume(&self) {
        let (in_progress, key) = self
            .read(|s| (s.turn_in_progress(), s.storage_key()))
            .await;
        if in_progress {
            return;
        }

        let restored = self.repository.restore(&key).await;
        if !restored.is_empty() {
            let mut store = self.store.lock().await;
            store.replace_log(restored);
        }
    }

    /// Removes the persisted slot for this conversation.
    pub async fn clear_persisted(&self) -> Result<()> {
        let key = self.read(|s| s.storage_key()).await;
        self.repository.clear(&key).await
    }

    /// Tears the session down: marks the store terminated (without
    /// mirroring) and removes the persisted slot.
    pub async fn terminate(&self) -> Result<()> {
        {
            let mut store = self.store.lock().await;
            store.terminate();
        }
        self.clear_persisted().await
    }
}
