//! Shared data model and collaborator traits for the agent control core.

pub mod client;
pub mod error;
pub mod events;
pub mod message;
pub mod routing;
pub mod tools;

pub use client::{ChatRequest, ModelClient, ModelStream};
pub use error::EngineError;
pub use events::{AgentEvent, ContextUsage, StopReason, StreamEvent, StreamResult, TokenUsage};
pub use message::{ContentSegment, Message, Role};
pub use routing::{ModelRoute, ModelRouter, RouteRole};
pub use tools::{ToolExecutor, ToolInvocation, ToolResult, ToolSchema};
