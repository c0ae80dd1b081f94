use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Tool arguments as a JSON object.
    pub input: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome of one tool execution, as it re-enters the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_invocation_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_invocation_id: tool_invocation_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_invocation_id: tool_invocation_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Schema describing one callable tool, forwarded with each model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool-execution collaborator.
///
/// `execute` always resolves: failures come back as `is_error` results so
/// the continuation engine can route every outcome through the circuit
/// breaker uniformly.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolResult;
    fn list_tools(&self) -> Vec<ToolSchema>;
}
