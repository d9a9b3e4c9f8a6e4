//! Browse state model.

use serde::{Deserialize, Serialize};

/// Application-level navigation state that outlives a single view.
///
/// Currently this is just the most recent search-listing URL, used by
/// conversation views to offer "back to results" navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseState {
    /// URL of the last search listing the user visited.
    #[serde(default)]
    pub last_search_url: Option<String>,
}
