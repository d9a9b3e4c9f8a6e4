//! Remote cached-context management.
//!
//! The backend keeps the conversation's source document in a per-session
//! cache. Context must be established before the first message and again
//! whenever the server reports a cache miss.

use async_trait::async_trait;
use serde::Serialize;

use jiwon_core::session::ContextRef;
use jiwon_core::{JiwonError, Result};

use crate::config::ApiConfig;

/// Establishes and releases server-side cached context for a session.
#[async_trait]
pub trait RemoteContext: Send + Sync {
    /// Caches the conversation's source document under `session_id`.
    async fn initialize(&self, session_id: &str, context: &ContextRef) -> Result<()>;

    /// Releases the cached context for `session_id`.
    async fn cleanup(&self, session_id: &str) -> Result<()>;
}

#[derive(Serialize)]
struct InitPolicyRequest<'a> {
    session_id: &'a str,
    policy_id: i64,
}

#[derive(Serialize)]
struct InitWebPolicyRequest<'a> {
    session_id: &'a str,
    web_id: &'a str,
    title: &'a str,
    url: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    session_id: &'a str,
}

/// HTTP implementation of [`RemoteContext`] against the chat API.
#[derive(Clone)]
pub struct HttpContextClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContextClient {
    /// Creates a context client from the endpoint configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| JiwonError::config(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| JiwonError::transport(format!("{path} request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(JiwonError::transport(format!(
                "{path} returned {status}: {body_text}"
            )));
        }
        Ok(())
    }

    /// Resets server-side conversation state for a session.
    pub async fn reset_session(&self, session_id: &str) -> Result<()> {
        self.post_json("/api/v1/session/reset", &SessionRequest { session_id })
            .await
    }
}

#[async_trait]
impl RemoteContext for HttpContextClient {
    async fn initialize(&self, session_id: &str, context: &ContextRef) -> Result<()> {
        match context {
            ContextRef::Policy { policy_id } => {
                self.post_json(
                    "/api/v1/chat/init-policy",
                    &InitPolicyRequest {
                        session_id,
                        policy_id: *policy_id,
                    },
                )
                .await
            }
            ContextRef::WebPosting(posting) => {
                self.post_json(
                    "/api/v1/chat/init-web-policy",
                    &InitWebPolicyRequest {
                        session_id,
                        web_id: &posting.id,
                        title: &posting.title,
                        url: &posting.url,
                        content: &posting.content,
                    },
                )
                .await
            }
        }
    }

    async fn cleanup(&self, session_id: &str) -> Result<()> {
        self.post_json("/api/v1/chat/cleanup", &SessionRequest { session_id })
            .await
    }
}
