//! Conversation context identity.
//!
//! A conversation is always about one source document: either a policy
//! stored in the database, or an ad-hoc web posting the user brought in.

use serde::{Deserialize, Serialize};

/// An ad-hoc web posting used as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPosting {
    /// Opaque identifier assigned by the search surface.
    pub id: String,
    pub title: String,
    pub url: String,
    /// The full posting text the server caches for answering.
    pub content: String,
}

/// Identifies which document a conversation concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextRef {
    /// A policy stored in the database, referenced by numeric id.
    Policy { policy_id: i64 },
    /// An ad-hoc web posting supplied by the caller.
    WebPosting(WebPosting),
}

impl ContextRef {
    /// The storage slot key for this conversation's persisted message log.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Policy { policy_id } => format!("qa_messages_{}", policy_id),
            Self::WebPosting(posting) => format!("qa_messages_web_{}", posting.id),
        }
    }

    /// The policy id sent on chat requests. Web postings use the sentinel `0`.
    pub fn wire_policy_id(&self) -> i64 {
        match self {
            Self::Policy { policy_id } => *policy_id,
            Self::WebPosting(_) => 0,
        }
    }

    /// The document view citations link to for this conversation.
    pub fn document_href(&self) -> String {
        format!("/policy/{}", self.wire_policy_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        let policy = ContextRef::Policy { policy_id: 42 };
        assert_eq!(policy.storage_key(), "qa_messages_42");

        let web = ContextRef::WebPosting(WebPosting {
            id: "kstartup-103".to_string(),
            title: "창업 지원 공고".to_string(),
            url: "https://www.k-startup.go.kr/103".to_string(),
            content: "공고 본문".to_string(),
        });
        assert_eq!(web.storage_key(), "qa_messages_web_kstartup-103");
    }

    #[test]
    fn test_document_href_uses_zero_for_web_postings() {
        let policy = ContextRef::Policy { policy_id: 42 };
        assert_eq!(policy.document_href(), "/policy/42");
        assert_eq!(policy.wire_policy_id(), 42);

        let web = ContextRef::WebPosting(WebPosting {
            id: "w1".to_string(),
            title: String::new(),
            url: String::new(),
            content: String::new(),
        });
        assert_eq!(web.document_href(), "/policy/0");
        assert_eq!(web.wire_policy_id(), 0);
    }
}
