//! Persistence traits for conversation state.
//!
//! These traits decouple the session engine from the specific storage
//! mechanism (JSON slot files, browser storage, a database). Absence and
//! malformed payloads are equivalent to an empty conversation by contract.

use async_trait::async_trait;

use crate::error::Result;

use super::context::WebPosting;
use super::message::ChatMessage;

/// An abstract repository for one-slot-per-conversation message logs.
///
/// Slots are keyed by conversation identity (see
/// [`ContextRef::storage_key`](super::context::ContextRef::storage_key)).
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Loads the persisted message log for `key`.
    ///
    /// Absent or malformed slots yield an empty log; this method never fails,
    /// so a damaged slot degrades to a fresh conversation.
    async fn restore(&self, key: &str) -> Vec<ChatMessage>;

    /// Persists the full log for `key`.
    ///
    /// Callers must not pass an empty log; implementations may additionally
    /// refuse one, so a stale empty state can never overwrite a real
    /// conversation.
    async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Removes the persisted slot for `key` (if any).
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Stores web-posting payloads so a conversation view can be reopened by
/// posting id without carrying the full payload around.
#[async_trait]
pub trait WebPostingRepository: Send + Sync {
    /// Loads a posting by its web id. Malformed payloads read as absent.
    async fn load(&self, web_id: &str) -> Option<WebPosting>;

    /// Persists a posting under its web id.
    async fn save(&self, posting: &WebPosting) -> Result<()>;

    /// Removes a persisted posting (if any).
    async fn remove(&self, web_id: &str) -> Result<()>;
}
