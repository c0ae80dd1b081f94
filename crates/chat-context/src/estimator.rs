//! Token estimation for budget management.
//!
//! Heuristic character-based estimation (chars / 3.5, English-text ratio),
//! not a real tokenizer. Intentionally cheap: the estimator runs over every
//! message on every turn.

use chat_core::{ContentSegment, Message};

/// Trait for token estimation implementations.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens in a plain text string.
    fn estimate_text(&self, text: &str) -> u32;

    /// Estimate tokens in a single content segment.
    fn estimate_segment(&self, segment: &ContentSegment) -> u32;

    /// Estimate tokens in a message, including structural overhead.
    fn estimate_message(&self, message: &Message) -> u32;

    /// Estimate tokens across multiple messages.
    fn estimate_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .fold(0u32, |acc, t| acc.saturating_add(t))
    }
}

/// Heuristic estimator: `ceil(chars / 3.5)` plus a fixed per-message
/// overhead for role/id framing.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    chars_per_token: f64,
    message_overhead: u32,
}

impl HeuristicEstimator {
    pub fn new(chars_per_token: f64, message_overhead: u32) -> Self {
        Self {
            chars_per_token,
            message_overhead,
        }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 3.5,
            message_overhead: 10,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u32
    }

    fn estimate_segment(&self, segment: &ContentSegment) -> u32 {
        // Exhaustive: every segment kind maps to its meaningful text.
        match segment {
            ContentSegment::Text { text } => self.estimate_text(text),
            ContentSegment::Code { code, .. } => self.estimate_text(code),
            ContentSegment::Thinking { thinking } => self.estimate_text(thinking),
            ContentSegment::ToolInvocation(invocation) => {
                let input = serde_json::to_string(&invocation.input).unwrap_or_default();
                self.estimate_text(&invocation.name)
                    .saturating_add(self.estimate_text(&input))
            }
            ContentSegment::ToolResult(result) => self.estimate_text(&result.content),
            ContentSegment::Image { alt, .. } => self.estimate_text(alt),
            ContentSegment::File { name, path } => self
                .estimate_text(name)
                .saturating_add(path.as_deref().map_or(0, |p| self.estimate_text(p))),
            ContentSegment::Other { kind } => self.estimate_text(kind),
        }
    }

    fn estimate_message(&self, message: &Message) -> u32 {
        message
            .content
            .iter()
            .map(|s| self.estimate_segment(s))
            .fold(0u32, |acc, t| acc.saturating_add(t))
            .saturating_add(self.message_overhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::ToolInvocation;
    use serde_json::json;

    #[test]
    fn estimates_text_with_ceiling() {
        let estimator = HeuristicEstimator::default();
        // 7 chars / 3.5 = 2.0 -> 2 tokens
        assert_eq!(estimator.estimate_text("abcdefg"), 2);
        // 8 chars / 3.5 ≈ 2.29 -> 3 tokens
        assert_eq!(estimator.estimate_text("abcdefgh"), 3);
    }

    #[test]
    fn empty_text_is_zero() {
        let estimator = HeuristicEstimator::default();
        assert_eq!(estimator.estimate_text(""), 0);
    }

    #[test]
    fn message_includes_structural_overhead() {
        let estimator = HeuristicEstimator::default();
        let message = Message::user("Hello, world!");
        let content = estimator.estimate_text("Hello, world!");
        assert_eq!(estimator.estimate_message(&message), content + 10);
    }

    #[test]
    fn tool_invocation_counts_serialized_input() {
        let estimator = HeuristicEstimator::default();
        let segment = ContentSegment::ToolInvocation(ToolInvocation::new(
            "call_1",
            "search",
            json!({"query": "budget manager"}),
        ));
        assert!(estimator.estimate_segment(&segment) > estimator.estimate_text("search"));
    }

    #[test]
    fn image_counts_alt_text_only() {
        let estimator = HeuristicEstimator::default();
        let segment = ContentSegment::Image {
            alt: "a diagram".to_string(),
            source: Some("data:image/png;base64,AAAA".repeat(100)),
        };
        assert_eq!(
            estimator.estimate_segment(&segment),
            estimator.estimate_text("a diagram")
        );
    }

    #[test]
    fn messages_sum_over_each_message() {
        let estimator = HeuristicEstimator::default();
        let messages = vec![Message::system("sys"), Message::user("hello")];
        let sum: u32 = messages.iter().map(|m| estimator.estimate_message(m)).sum();
        assert_eq!(estimator.estimate_messages(&messages), sum);
    }
}
