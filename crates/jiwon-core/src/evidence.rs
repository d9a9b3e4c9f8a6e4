//! Evidence types for citation targets.
//!
//! Evidence is the passive data attached to an assistant answer: excerpts of
//! the cached policy document, or web sources found during answer generation.

use serde::{Deserialize, Serialize};

/// Discriminates the two kinds of citable sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    /// An excerpt of the policy document the conversation is about.
    #[serde(rename = "policy_doc")]
    PolicyDoc,
    /// A web source retrieved during answer generation.
    #[serde(rename = "web_source")]
    WebSource,
}

/// A single citable unit of supporting material.
///
/// Policy-document items carry `policy_id`/`document_id`/`chunk_id`;
/// web sources carry `url`/`title`. The server emits evidence in a
/// significant order: the 1-based position of an item within the
/// web-source subset is the number users and citations refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    /// The underlying snippet text.
    pub content: String,
    /// Optional relevance score assigned by the retriever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Evidence {
    /// Creates a policy-document evidence item.
    pub fn policy_doc(policy_id: i64, chunk_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::PolicyDoc,
            policy_id: Some(policy_id),
            document_id: None,
            chunk_id: Some(chunk_id.into()),
            content: content.into(),
            score: None,
            url: None,
            title: None,
        }
    }

    /// Creates a web-source evidence item.
    pub fn web_source(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::WebSource,
            policy_id: None,
            document_id: None,
            chunk_id: None,
            content: content.into(),
            score: None,
            url: Some(url.into()),
            title: Some(title.into()),
        }
    }

    /// True if this item belongs to the web-source subset citations index.
    pub fn is_web_source(&self) -> bool {
        self.kind == EvidenceKind::WebSource
    }
}

/// Iterates the web-source items of an evidence list in emission order.
///
/// Web citations are numbered 1-based against this subset, so the
/// iteration order must match the order the server emitted.
pub fn web_sources(evidence: &[Evidence]) -> impl Iterator<Item = &Evidence> {
    evidence.iter().filter(|e| e.is_web_source())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_sources_preserves_emission_order() {
        let evidence = vec![
            Evidence::web_source("https://a.example", "A", "a"),
            Evidence::policy_doc(7, "c1", "doc"),
            Evidence::web_source("https://b.example", "B", "b"),
        ];

        let urls: Vec<_> = web_sources(&evidence)
            .filter_map(|e| e.url.as_deref())
            .collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_wire_format_round_trip() {
        let json = r#"{
            "type": "web_source",
            "content": "snippet",
            "score": 0.82,
            "url": "https://news.example/post",
            "title": "Funding news"
        }"#;

        let parsed: Evidence = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind, EvidenceKind::WebSource);
        assert_eq!(parsed.url.as_deref(), Some("https://news.example/post"));

        let emitted = serde_json::to_value(&parsed).unwrap();
        assert_eq!(emitted["type"], "web_source");
        // Absent policy-side fields stay absent on the wire.
        assert!(emitted.get("policy_id").is_none());
    }
}
