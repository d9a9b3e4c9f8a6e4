//! Wire types for the streaming chat protocol.
//!
//! The backend answers a chat request with a single long-lived response
//! carrying server-sent-event lines. Each `data:` line holds one typed JSON
//! event; everything else (comments, keep-alives, unknown payloads) is
//! ignored.

use serde::{Deserialize, Serialize};

use jiwon_core::evidence::Evidence;

/// Error code signalling that the server lost the cached document context
/// for the session.
pub const CACHE_MISS_CODE: &str = "CACHE_MISS";

/// Request body for one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub policy_id: i64,
}

/// One typed event on the chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of the answer text, to append in emission order.
    Chunk { content: String },
    /// Informational progress message; never touches the message log.
    Status { message: String },
    /// The evidence list backing the answer; may arrive once per turn.
    Evidence { evidence: Vec<Evidence> },
    /// Terminal failure for this turn.
    Error { code: String, message: String },
    /// Terminal success marker.
    Done,
}

/// Parses one line of the response body into a stream event.
///
/// Returns `None` for blank lines, SSE comments, non-data fields, and
/// payloads that fail to parse (logged and skipped, never fatal).
pub fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    match serde_json::from_str(data) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(%err, "skipping unparseable stream line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_chunk_event() {
        let event = parse_sse_line(r#"data: {"type":"chunk","content":"안녕"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Chunk {
                content: "안녕".to_string()
            }
        );
    }

    #[test]
    fn test_parses_evidence_event() {
        let line = r#"data: {"type":"evidence","evidence":[{"type":"web_source","content":"c","url":"https://a.example"}]}"#;
        let StreamEvent::Evidence { evidence } = parse_sse_line(line).unwrap() else {
            panic!("expected evidence event");
        };
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].url.as_deref(), Some("https://a.example"));
    }

    #[test]
    fn test_parses_error_and_done() {
        let event =
            parse_sse_line(r#"data: {"type":"error","code":"CACHE_MISS","message":"expired"}"#)
                .unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                code: CACHE_MISS_CODE.to_string(),
                message: "expired".to_string()
            }
        );

        assert_eq!(
            parse_sse_line(r#"data: {"type":"done"}"#).unwrap(),
            StreamEvent::Done
        );
    }

    #[test]
    fn test_skips_comments_blanks_and_garbage() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: not json"), None);
        assert_eq!(parse_sse_line(r#"data: {"type":"unknown"}"#), None);
    }
}
