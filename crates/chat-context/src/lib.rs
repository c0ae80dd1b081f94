//! Context budget management: token estimation, relevance scoring, lossy
//! compression, and pruning that keeps a conversation inside a hard token
//! ceiling.

pub mod budget;
pub mod compressor;
pub mod estimator;
pub mod manager;
pub mod scorer;
pub mod tool_output;

pub use budget::TokenBudget;
pub use compressor::{compress_patterns, compress_segment};
pub use estimator::{HeuristicEstimator, TokenEstimator};
pub use manager::{ContextBudgetManager, EVICTION_PLACEHOLDER};
pub use scorer::{extract_keywords, score_message};
pub use tool_output::compress_tool_result;
