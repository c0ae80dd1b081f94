//! Tool-continuation engine: streams a model response, executes requested
//! tools, feeds results back, and repeats within hard bounds.

pub mod breaker;
pub mod config;
pub mod continuation;
pub mod engine;
pub mod runner;
pub mod stream;

pub use breaker::CircuitBreaker;
pub use config::LoopConfig;
pub use continuation::{continue_if_truncated, CONTINUATION_INSTRUCTION};
pub use engine::AgentEngine;
pub use runner::run_continuation;
pub use stream::{consume_model_stream, StreamOutput};
