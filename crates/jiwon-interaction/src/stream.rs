//! Stream consumer: folds protocol events into the session store.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;

use jiwon_core::session::{PersistenceBridge, TurnToken};

use crate::config::ApiConfig;
use crate::protocol::{CACHE_MISS_CODE, ChatRequest, StreamEvent, parse_sse_line};

/// How a single turn attempt failed.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    /// Network-level failure before any terminal event was observed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The server reported a terminal error event.
    #[error("stream error {code}: {message}")]
    Remote { code: String, message: String },
}

impl TurnError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// True for the recoverable "server lost the cached context" failure.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::Remote { code, .. } if code == CACHE_MISS_CODE)
    }
}

/// Consumes status events for diagnostics. Status never mutates the log.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, message: &str);
}

/// Observer that discards status events.
pub struct NullObserver;

impl StatusObserver for NullObserver {
    fn on_status(&self, _message: &str) {}
}

/// Drives one streaming turn attempt against the remote assistant.
///
/// Implementations ingest protocol events and fold them into the session
/// through the bridge under the given turn token; they have no side effects
/// beyond those store mutations.
#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn run_turn(
        &self,
        request: &ChatRequest,
        session: &PersistenceBridge,
        token: TurnToken,
        observer: &dyn StatusObserver,
    ) -> Result<(), TurnError>;
}

/// HTTP implementation of [`TurnTransport`] over the chat stream endpoint.
#[derive(Clone)]
pub struct HttpChatStream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatStream {
    /// Creates a stream client from the endpoint configuration.
    pub fn new(config: &ApiConfig) -> jiwon_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| jiwon_core::JiwonError::config(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl TurnTransport for HttpChatStream {
    async fn run_turn(
        &self,
        request: &ChatRequest,
        session: &PersistenceBridge,
        token: TurnToken,
        observer: &dyn StatusObserver,
    ) -> Result<(), TurnError> {
        let url = format!("{}/api/v1/chat/stream", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| TurnError::transport(format!("chat stream request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TurnError::transport(format!(
                "chat stream returned {status}: {body}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|err| TurnError::transport(format!("chat stream read failed: {err}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].to_string();
                buffer = buffer[line_end + 1..].to_string();

                let Some(event) = parse_sse_line(&line) else {
                    continue;
                };
                match event {
                    StreamEvent::Chunk { content } => {
                        session.mutate(|s| s.append_chunk(token, &content)).await;
                    }
                    StreamEvent::Status { message } => observer.on_status(&message),
                    StreamEvent::Evidence { evidence } => {
                        session.mutate(|s| s.attach_evidence(token, evidence)).await;
                    }
                    StreamEvent::Error { code, message } => {
                        return Err(TurnError::Remote { code, message });
                    }
                    StreamEvent::Done => {
                        session.mutate(|s| s.complete_turn(token)).await;
                        return Ok(());
                    }
                }
            }
        }

        // The transport ended without a terminal event.
        Err(TurnError::transport("stream closed before completion"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_detection() {
        let miss = TurnError::Remote {
            code: CACHE_MISS_CODE.to_string(),
            message: "session cache expired".to_string(),
        };
        assert!(miss.is_cache_miss());

        let other = TurnError::Remote {
            code: "INTERNAL".to_string(),
            message: "boom".to_string(),
        };
        assert!(!other.is_cache_miss());
        assert!(!TurnError::transport("timeout").is_cache_miss());
    }
}
