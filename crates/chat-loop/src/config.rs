use std::time::Duration;

/// Configuration for the continuation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Hard ceiling on tool-continuation rounds.
    pub max_tool_depth: usize,
    /// Follow-up requests issued for a length-truncated response.
    pub max_continuation_rounds: usize,
    /// Whether truncated responses are automatically continued.
    pub auto_continue: bool,
    /// Character cap applied to each raw tool result.
    pub tool_result_cap_chars: usize,
    /// Inter-round delay grows linearly from this base.
    pub round_delay_base: Duration,
    /// Cap on the inter-round delay.
    pub round_delay_max: Duration,
    /// System-level context attached to every request of a turn.
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_depth: 25,
            max_continuation_rounds: 3,
            auto_continue: true,
            tool_result_cap_chars: 25_000,
            round_delay_base: Duration::from_millis(200),
            round_delay_max: Duration::from_secs(3),
            system_prompt: None,
        }
    }
}
