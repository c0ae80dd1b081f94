use crate::tools::{ToolInvocation, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One typed unit of message content.
///
/// Closed union: deserializing an unrecognized tag is an error, never a
/// silent fallthrough to a generic variant. Compression constructs new
/// segments rather than mutating existing ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    Text {
        text: String,
    },
    Code {
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        code: String,
    },
    Thinking {
        thinking: String,
    },
    ToolInvocation(ToolInvocation),
    ToolResult(ToolResult),
    Image {
        alt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    File {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Other {
        kind: String,
    },
}

impl ContentSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
        }
    }

    pub fn code(language: Option<String>, code: impl Into<String>) -> Self {
        Self::Code {
            language,
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentSegment>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentSegment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            conversation_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentSegment::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentSegment::text(text)])
    }

    pub fn assistant(content: Vec<ContentSegment>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tool results re-enter the transcript as a user turn carrying
    /// `ToolResult` segments; there is no dedicated tool role.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(
            Role::User,
            results.into_iter().map(ContentSegment::ToolResult).collect(),
        )
    }

    /// Concatenated text of all plain-text segments, for keyword scans.
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.content {
            if let ContentSegment::Text { text } = segment {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}
