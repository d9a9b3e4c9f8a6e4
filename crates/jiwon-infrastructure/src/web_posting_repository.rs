//! JSON-file-backed WebPostingRepository implementation.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use jiwon_core::Result;
use jiwon_core::session::{WebPosting, WebPostingRepository};

use crate::json_slot::{read_json, remove_if_exists, sanitize_key, write_json};

/// Stores web-posting payloads one JSON file per posting id, so a
/// conversation about an ad-hoc posting can be reopened by id alone.
pub struct JsonWebPostingRepository {
    base_dir: PathBuf,
}

impl JsonWebPostingRepository {
    /// Creates a repository rooted at `base_dir`, creating the slot
    /// directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(base_dir.join("web_postings"))?;
        Ok(Self { base_dir })
    }

    /// Creates a repository at the default location (`~/.jiwon`).
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| jiwon_core::JiwonError::config("could not determine home directory"))?;
        Self::new(home.join(".jiwon"))
    }

    fn slot_path(&self, web_id: &str) -> PathBuf {
        self.base_dir
            .join("web_postings")
            .join(format!("{}.json", sanitize_key(web_id)))
    }
}

#[async_trait]
impl WebPostingRepository for JsonWebPostingRepository {
    async fn load(&self, web_id: &str) -> Option<WebPosting> {
        read_json(&self.slot_path(web_id))
    }

    async fn save(&self, posting: &WebPosting) -> Result<()> {
        write_json(&self.slot_path(&posting.id), posting)
    }

    async fn remove(&self, web_id: &str) -> Result<()> {
        remove_if_exists(&self.slot_path(web_id))
    }
}
