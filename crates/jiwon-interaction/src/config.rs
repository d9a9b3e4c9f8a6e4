//! API endpoint configuration.
//!
//! Configuration priority: `~/.config/jiwon/config.json` > environment
//! variables (`JIWON_API_BASE_URL`) > built-in defaults.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default backend endpoint for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

// Generous deadline: answer generation can take a while.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Optional on-disk configuration file shape.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Resolved API client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `~/.config/jiwon/config.json`, falling back
    /// to `JIWON_API_BASE_URL` and the built-in defaults.
    pub fn load() -> Self {
        let file = load_config_file().unwrap_or_default();

        let base_url = file
            .base_url
            .or_else(|| env::var("JIWON_API_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout = Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        Self {
            base_url: normalize_base_url(base_url),
            timeout,
        }
    }

    /// Overrides the base URL after construction.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn load_config_file() -> Option<ConfigFile> {
    let path = config_path()?;
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed config file");
            None
        }
    }
}

fn config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".config").join("jiwon").join("config.json"))
}
