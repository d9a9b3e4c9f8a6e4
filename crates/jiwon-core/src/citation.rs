//! Citation resolution for assistant answers.
//!
//! Assistant text cites its sources inline: bracketed markers such as
//! `[정책문서 1]`, `[웹 2, 3]`, or mixed `[정책문서 1, 웹 2]`, plus literal
//! markdown links. Resolution rewrites these into actionable links against
//! the answer's evidence list at render time; stored content keeps the raw
//! markers, so evidence arriving late or differing across renders never
//! rewrites history.
//!
//! The transform runs as two passes over a segment representation of the
//! text: markdown links are lifted into opaque link segments first, then the
//! remaining plain-text segments are scanned for citation brackets. Link
//! segments are never rescanned, which makes resolution idempotent over its
//! own rendering.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::evidence::{Evidence, web_sources};

/// Distinguishes how a link was produced, mostly for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A literal markdown link in the answer text.
    External,
    /// A policy-document citation pointing at the conversation's document view.
    PolicyDoc,
    /// A web citation resolved against the evidence list.
    WebSource,
}

/// An actionable link produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationLink {
    pub label: String,
    pub href: String,
    pub kind: LinkKind,
}

/// One piece of resolved answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Link(CitationLink),
}

/// Resolved answer text, renderable as markdown or HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText(Vec<Segment>);

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(((?:https?://|/)[^\s)]*)\)").unwrap());
static BRACKET_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static POLICY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"정책문서\s*([\d,\s]+)").unwrap());
static WEB_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"웹(?:\s*검색)?\s*([\d,\s]+)").unwrap());

/// Resolves citation markers in `text` against `evidence`.
///
/// `document_href` is where policy-document citations point for the current
/// conversation (see [`ContextRef::document_href`](crate::session::ContextRef::document_href)).
/// Policy-document numbers are labels chosen by the answer generator and are
/// rendered as-is; web numbers index the web-source subset of `evidence`
/// 1-based, degrading to a plain label when out of range. Brackets that
/// carry neither marker pass through untouched.
pub fn resolve(text: &str, evidence: &[Evidence], document_href: &str) -> ResolvedText {
    let segments = lift_markdown_links(text);
    let segments = rewrite_citation_brackets(segments, evidence, document_href);
    ResolvedText(segments)
}

impl ResolvedText {
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Renders links as `[label](href)`. Resolving the rendering again
    /// reproduces the same segments.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Link(link) => {
                    out.push('[');
                    out.push_str(&link.label);
                    out.push_str("](");
                    out.push_str(&link.href);
                    out.push(')');
                }
            }
        }
        out
    }

    /// Renders links as anchor tags opening in a new tab.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            match segment {
                Segment::Text(text) => out.push_str(&escape_html(text)),
                Segment::Link(link) => {
                    out.push_str("<a href=\"");
                    out.push_str(&escape_html(&link.href));
                    out.push_str("\" target=\"_blank\" rel=\"noopener noreferrer\">");
                    out.push_str(&escape_html(&link.label));
                    out.push_str("</a>");
                }
            }
        }
        out
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Pass 1: lift markdown-style links out of the raw text.
fn lift_markdown_links(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for captures in MARKDOWN_LINK.captures_iter(text) {
        let whole = captures.get(0).unwrap();
        if whole.start() > cursor {
            segments.push(Segment::Text(text[cursor..whole.start()].to_string()));
        }
        segments.push(Segment::Link(CitationLink {
            label: captures[1].to_string(),
            href: captures[2].to_string(),
            kind: LinkKind::External,
        }));
        cursor = whole.end();
    }
    if cursor < text.len() {
        segments.push(Segment::Text(text[cursor..].to_string()));
    }
    segments
}

/// Pass 2: rewrite citation brackets inside the remaining text segments.
fn rewrite_citation_brackets(
    segments: Vec<Segment>,
    evidence: &[Evidence],
    document_href: &str,
) -> Vec<Segment> {
    let mut out = Vec::new();
    for segment in segments {
        match segment {
            Segment::Link(_) => out.push(segment),
            Segment::Text(text) => rewrite_brackets_in_text(&text, evidence, document_href, &mut out),
        }
    }
    out
}

fn rewrite_brackets_in_text(
    text: &str,
    evidence: &[Evidence],
    document_href: &str,
    out: &mut Vec<Segment>,
) {
    let mut cursor = 0;
    for captures in BRACKET_GROUP.captures_iter(text) {
        // Brackets that are not citations stay in the surrounding text.
        let Some(items) = parse_citation_group(&captures[1], evidence, document_href) else {
            continue;
        };

        let whole = captures.get(0).unwrap();
        if whole.start() > cursor {
            out.push(Segment::Text(text[cursor..whole.start()].to_string()));
        }
        out.push(Segment::Text("[".to_string()));
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out.push(Segment::Text(", ".to_string()));
            }
            out.push(item);
        }
        out.push(Segment::Text("]".to_string()));
        cursor = whole.end();
    }
    if cursor < text.len() {
        out.push(Segment::Text(text[cursor..].to_string()));
    }
}

/// Parses one bracket's inner text. Returns the replacement items, or `None`
/// when the bracket carries neither citation marker.
fn parse_citation_group(
    content: &str,
    evidence: &[Evidence],
    document_href: &str,
) -> Option<Vec<Segment>> {
    let mut items: Vec<Segment> = Vec::new();
    let mut matched = false;

    if let Some(captures) = POLICY_MARKER.captures(content) {
        matched = true;
        for number in captures[1].split(',') {
            let number = number.trim();
            if number.is_empty() {
                continue;
            }
            items.push(Segment::Link(CitationLink {
                label: format!("정책문서 {}", number),
                href: document_href.to_string(),
                kind: LinkKind::PolicyDoc,
            }));
        }
    }

    if let Some(captures) = WEB_MARKER.captures(content) {
        matched = true;
        for entry in captures[1].split(',') {
            // Malformed numbers are dropped silently.
            let Ok(number) = entry.trim().parse::<usize>() else {
                continue;
            };
            let target = number
                .checked_sub(1)
                .and_then(|idx| web_sources(evidence).nth(idx))
                .and_then(|e| e.url.clone());
            let label = format!("웹 검색 {}", number);
            match target {
                Some(url) => items.push(Segment::Link(CitationLink {
                    label,
                    href: url,
                    kind: LinkKind::WebSource,
                })),
                // Out of range or unlinked evidence: plain label, never an error.
                None => items.push(Segment::Text(label)),
            }
        }
    }

    matched.then_some(items)
}
