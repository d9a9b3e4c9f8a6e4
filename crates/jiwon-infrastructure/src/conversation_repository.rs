//! JSON-file-backed ConversationRepository implementation.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use jiwon_core::Result;
use jiwon_core::session::{ChatMessage, ConversationRepository};

use crate::json_slot::{read_json, remove_if_exists, sanitize_key, write_json};

/// Stores one conversation log per JSON file.
///
/// Directory structure:
/// ```text
/// base_dir/
/// └── conversations/
///     ├── qa_messages_42.json
///     └── qa_messages_web_kstartup-103.json
/// ```
pub struct JsonConversationRepository {
    base_dir: PathBuf,
}

impl JsonConversationRepository {
    /// Creates a repository rooted at `base_dir`, creating the slot
    /// directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(base_dir.join("conversations"))?;
        Ok(Self { base_dir })
    }

    /// Creates a repository at the default location (`~/.jiwon`).
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| jiwon_core::JiwonError::config("could not determine home directory"))?;
        Self::new(home.join(".jiwon"))
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.base_dir
            .join("conversations")
            .join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl ConversationRepository for JsonConversationRepository {
    async fn restore(&self, key: &str) -> Vec<ChatMessage> {
        read_json(&self.slot_path(key)).unwrap_or_default()
    }

    async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()> {
        // A stale empty state must never overwrite a real conversation.
        if messages.is_empty() {
            return Ok(());
        }
        write_json(&self.slot_path(key), &messages)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.slot_path(key))
    }
}
