use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::EngineError;
use crate::events::StreamEvent;
use crate::message::Message;
use crate::tools::ToolSchema;

pub type Result<T> = std::result::Result<T, EngineError>;

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// One request to the model-streaming collaborator.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub thinking_enabled: bool,
    /// Extra system-level context appended by the host (workflow prompts etc.).
    pub additional_context: Option<String>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            thinking_enabled: false,
            additional_context: None,
            max_tokens: None,
        }
    }
}

/// Model-streaming collaborator.
///
/// The core treats this purely as an event source plus a terminal `Done`
/// event; provider wire formats live behind the implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ModelStream>;
}
