//! Failure circuit breaker for repeated tool calls.
//!
//! Owned by one turn's continuation run; never shared across turns.

use std::collections::HashMap;

use chat_core::ToolInvocation;

/// Identical tool calls that have failed this many times are skipped.
pub const MAX_SAME_TOOL_FAILURES: u32 = 2;
/// All-failing rounds before the stop hint is appended.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Advisory instruction appended to the last tool result once tripped.
pub const STOP_HINT: &str =
    "Multiple consecutive tool calls have failed. Stop retrying and respond with what you have.";

/// Serialized-input prefix length used for call identity.
const KEY_INPUT_PREFIX: usize = 100;

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    failures: HashMap<(String, String), u32>,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call identity: tool name plus a truncated serialized-input prefix.
    /// Inputs differing only past the prefix collide and share a count;
    /// callers depend on this dedup granularity.
    fn key(invocation: &ToolInvocation) -> (String, String) {
        let serialized = serde_json::to_string(&invocation.input).unwrap_or_default();
        let prefix: String = serialized.chars().take(KEY_INPUT_PREFIX).collect();
        (invocation.name.clone(), prefix)
    }

    /// Whether this invocation is known to fail identically and should be
    /// dropped instead of re-issued.
    pub fn should_skip(&self, invocation: &ToolInvocation) -> bool {
        self.failures
            .get(&Self::key(invocation))
            .copied()
            .unwrap_or(0)
            >= MAX_SAME_TOOL_FAILURES
    }

    pub fn record_failure(&mut self, invocation: &ToolInvocation) {
        *self.failures.entry(Self::key(invocation)).or_insert(0) += 1;
    }

    /// Close out one round: any success resets the consecutive counter,
    /// an all-failing round increments it.
    pub fn finish_round(&mut self, any_success: bool) {
        if any_success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }

    pub fn stop_hint_tripped(&self) -> bool {
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }
}
