//! Relevance scoring for compressible messages.
//!
//! Combines recency, role weight, and topic overlap with the current user
//! query into a [0, 1] score used to rank messages for eviction.

use std::collections::HashSet;

use chat_core::{Message, Role};

/// Words too common to signal topic overlap.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "what", "when", "where",
    "which", "will", "would", "there", "their", "about", "could", "should", "these", "those",
    "into", "only", "other", "some", "then", "than", "them", "were", "been", "being", "also",
    "just", "like", "make", "made", "want", "need", "please", "does", "how", "why",
];

/// Extract topic keywords from a message's visible text.
///
/// Tokens are lowercase runs of alphanumerics plus path characters, longer
/// than two characters, with stopwords removed.
pub fn extract_keywords(message: &Message) -> HashSet<String> {
    keywords_from_text(&message.visible_text())
}

fn keywords_from_text(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '/' | '\\' | '.' | '_' | '-')))
        .map(|token| token.trim_matches(|c: char| matches!(c, '.' | '-' | '_')))
        .filter(|token| token.len() > 2)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Score one compressible message.
///
/// Three additive components, each clamped to its sub-range:
/// recency (0–0.3), role weight (0–0.2), topic overlap (0–0.5).
pub fn score_message(
    message: &Message,
    index: usize,
    protected_boundary: usize,
    compressible_span: usize,
    query_keywords: &HashSet<String>,
) -> f64 {
    let span = compressible_span.max(1) as f64;
    let distance = protected_boundary.saturating_sub(index) as f64;
    let recency = ((1.0 - distance / span) * 0.3).clamp(0.0, 0.3);

    // User messages are intentional and information-dense.
    let role_weight = match message.role {
        Role::User => 0.2,
        Role::Assistant => 0.1,
        Role::System => 0.0,
    };

    let overlap = if query_keywords.is_empty() {
        0.0
    } else {
        let candidate = extract_keywords(message);
        let shared = candidate.intersection(query_keywords).count() as f64;
        ((shared / query_keywords.len() as f64) * 0.5).clamp(0.0, 0.5)
    };

    (recency + role_weight + overlap).clamp(0.0, 1.0)
}
