//! JSON-file-backed StateRepository implementation.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use jiwon_core::Result;
use jiwon_core::state::{BrowseState, StateRepository};

use crate::json_slot::{read_json, write_json};

/// Persists browse state in a single `browse_state.json` file.
pub struct JsonStateRepository {
    path: PathBuf,
}

impl JsonStateRepository {
    /// Creates a repository rooted at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            path: base_dir.join("browse_state.json"),
        })
    }

    /// Creates a repository at the default location (`~/.jiwon`).
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| jiwon_core::JiwonError::config("could not determine home directory"))?;
        Self::new(home.join(".jiwon"))
    }

    fn load(&self) -> BrowseState {
        read_json(&self.path).unwrap_or_default()
    }

    fn store(&self, state: &BrowseState) -> Result<()> {
        write_json(&self.path, state)
    }
}

#[async_trait]
impl StateRepository for JsonStateRepository {
    async fn last_search_url(&self) -> Option<String> {
        self.load().last_search_url
    }

    async fn set_last_search_url(&self, url: String) -> Result<()> {
        let mut state = self.load();
        state.last_search_url = Some(url);
        self.store(&state)
    }

    async fn clear_last_search_url(&self) -> Result<()> {
        let mut state = self.load();
        state.last_search_url = None;
        self.store(&state)
    }
}
