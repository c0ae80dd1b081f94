use crate::message::ContentSegment;
use crate::tools::{ToolInvocation, ToolResult};
use serde::{Deserialize, Serialize};

/// Terminal condition of a model response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Accumulate usage from a follow-up request onto this one.
    pub fn merge(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Terminal value of one streamed model response.
#[derive(Debug, Clone)]
pub struct StreamResult {
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
    pub content: Vec<ContentSegment>,
    pub tool_invocations: Vec<ToolInvocation>,
}

/// One event pushed by the model-streaming collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolInvocation(ToolInvocation),
    /// UI rendering hint; carries no control-flow meaning in this core.
    ModeHint {
        hint: String,
    },
    VideoEmbed {
        url: String,
    },
    Done {
        stop_reason: StopReason,
        usage: TokenUsage,
    },
}

/// Progress events pushed to the host over the turn's event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        content: String,
    },

    Thinking {
        content: String,
    },

    ToolStart {
        tool_invocation_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    ToolComplete {
        tool_invocation_id: String,
        result: ToolResult,
    },

    /// Emitted after the budget manager prepares a turn's context.
    ContextPrepared {
        usage: ContextUsage,
    },

    Complete {
        usage: TokenUsage,
    },

    Error {
        message: String,
    },
}

/// Breakdown of a prepared context, sent to the host after preparation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextUsage {
    /// Tokens used by system message(s)
    pub system_tokens: u32,
    /// Tokens used by the protected recent window
    pub protected_tokens: u32,
    /// Tokens used by compressed older messages
    pub compressible_tokens: u32,
    /// Total tokens in the prepared context
    pub total_tokens: u32,
    /// Usable input budget
    pub budget_limit: u32,
    /// Number of messages evicted outright
    pub messages_evicted: usize,
    /// Number of messages kept in compressed form
    pub messages_compressed: usize,
}
