use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// User-initiated abort. Never conflated with a transport fault.
    #[error("Cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed stream event: {0}")]
    Parse(String),

    #[error("Tool error: {0}")]
    Tool(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
