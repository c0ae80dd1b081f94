//! Token budget configuration for a conversation.

use serde::{Deserialize, Serialize};

/// Token budget for one conversation.
///
/// Invariant: `compression_trigger` sits below the usable input budget, so
/// the manager starts compressing before the hard ceiling is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Maximum context window size for the model (input + output)
    pub max_total: u32,
    /// Tokens reserved for the system prompt
    pub system_reserve: u32,
    /// Tokens reserved for the model's response
    pub response_reserve: u32,
    /// Threshold above which the budget manager begins acting
    pub compression_trigger: u32,
    /// Recent message pairs kept verbatim
    pub protected_pair_count: usize,
    /// Floor for the protected window under the reduced-protection fallback
    pub min_protected_pair_count: usize,
}

impl TokenBudget {
    pub fn new(max_total: u32, system_reserve: u32, response_reserve: u32) -> Self {
        let usable = max_total
            .saturating_sub(system_reserve)
            .saturating_sub(response_reserve);
        Self {
            max_total,
            system_reserve,
            response_reserve,
            // Trigger slightly below the ceiling so compression has headroom.
            compression_trigger: (usable as f64 * 0.9) as u32,
            protected_pair_count: 4,
            min_protected_pair_count: 1,
        }
    }

    /// Usable token ceiling after reserving room for the system prompt and
    /// the model's response.
    pub fn usable_input_tokens(&self) -> u32 {
        self.max_total
            .saturating_sub(self.system_reserve)
            .saturating_sub(self.response_reserve)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        // Sized for a 200k-context model.
        Self {
            max_total: 200_000,
            system_reserve: 15_000,
            response_reserve: 25_000,
            compression_trigger: 150_000,
            protected_pair_count: 4,
            min_protected_pair_count: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_budget_subtracts_both_reserves() {
        let budget = TokenBudget::default();
        assert_eq!(budget.usable_input_tokens(), 160_000);
    }

    #[test]
    fn trigger_sits_below_usable_budget() {
        let budget = TokenBudget::new(100_000, 5_000, 10_000);
        assert!(budget.compression_trigger < budget.usable_input_tokens());
    }
}
