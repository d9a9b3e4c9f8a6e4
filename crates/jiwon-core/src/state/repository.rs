//! Browse state repository trait.

use async_trait::async_trait;

use crate::error::Result;

/// Persistence for [`BrowseState`](super::BrowseState) fields.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// The most recent search-listing URL, if one was recorded.
    async fn last_search_url(&self) -> Option<String>;

    /// Records the most recent search-listing URL.
    async fn set_last_search_url(&self, url: String) -> Result<()>;

    /// Clears the recorded search-listing URL.
    async fn clear_last_search_url(&self) -> Result<()>;
}
