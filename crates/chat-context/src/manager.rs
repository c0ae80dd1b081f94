//! Context preparation with budget enforcement.
//!
//! Orchestrates estimation, scoring, compression, and pruning so a
//! conversation fits its token ceiling. Degrades by dropping the least
//! relevant, oldest material first; never errors on overflow, never
//! reorders messages, never touches system messages.

use std::collections::HashSet;
use std::sync::Arc;

use chat_core::{ContentSegment, ContextUsage, Message, Role};

use crate::budget::TokenBudget;
use crate::compressor::compress_segment;
use crate::estimator::{HeuristicEstimator, TokenEstimator};
use crate::scorer::{extract_keywords, score_message};

/// Placeholder standing in for a run of evicted messages.
pub const EVICTION_PLACEHOLDER: &str = "[Earlier conversation removed for context management]";
/// Placeholder inserted when compression removes every segment of a message.
const EMPTY_MESSAGE_PLACEHOLDER: &str = "[Content compressed]";

/// A compressible message with its derived score and compressed form.
struct ScoredEntry {
    index: usize,
    compressed: Message,
    score: f64,
    tokens: u32,
}

pub struct ContextBudgetManager {
    budget: TokenBudget,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextBudgetManager {
    pub fn new(budget: TokenBudget) -> Self {
        Self {
            budget,
            estimator: Arc::new(HeuristicEstimator::default()),
        }
    }

    pub fn with_estimator(budget: TokenBudget, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { budget, estimator }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Prepare a conversation for the next model request.
    ///
    /// Fast paths: two messages or fewer, or an estimated total below the
    /// compression trigger, return the input unchanged.
    pub fn prepare(&self, messages: &[Message]) -> (Vec<Message>, ContextUsage) {
        let usable = self.budget.usable_input_tokens();

        if messages.len() <= 2 {
            return (messages.to_vec(), self.passthrough_usage(messages, usable));
        }

        let total = self.estimator.estimate_messages(messages);
        if total < self.budget.compression_trigger {
            tracing::debug!(
                total,
                trigger = self.budget.compression_trigger,
                "context below compression trigger, passing through"
            );
            return (messages.to_vec(), self.passthrough_usage(messages, usable));
        }

        self.prepare_with_protection(messages, self.budget.protected_pair_count, usable)
    }

    fn prepare_with_protection(
        &self,
        messages: &[Message],
        protected_pairs: usize,
        usable: u32,
    ) -> (Vec<Message>, ContextUsage) {
        let (system_indices, protected_set, compressible) =
            partition(messages, protected_pairs * 2);

        if compressible.is_empty() {
            if protected_pairs > self.budget.min_protected_pair_count {
                tracing::debug!(
                    protected_pairs,
                    "protected window leaves nothing to compress, reducing protection"
                );
                return self.reduced_protection_pass(messages, usable);
            }
            // Nothing to act on; the protected window is already minimal.
            return (messages.to_vec(), self.passthrough_usage(messages, usable));
        }

        let protected_boundary = protected_set.iter().copied().min().unwrap_or(messages.len());
        let first_compressible = compressible.first().copied().unwrap_or(0);
        let span = protected_boundary.saturating_sub(first_compressible).max(1);

        // Topic keywords come from the most recent user message.
        let query_keywords = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(extract_keywords)
            .unwrap_or_default();

        let system_tokens: u32 = system_indices
            .iter()
            .map(|&i| self.estimator.estimate_message(&messages[i]))
            .fold(0, u32::saturating_add);
        let protected_tokens: u32 = protected_set
            .iter()
            .map(|&i| self.estimator.estimate_message(&messages[i]))
            .fold(0, u32::saturating_add);

        // Compression is per-message and order-independent.
        let mut entries: Vec<ScoredEntry> = compressible
            .iter()
            .map(|&i| {
                let compressed = compress_message(&messages[i]);
                let tokens = self.estimator.estimate_message(&compressed);
                let score = score_message(
                    &messages[i],
                    i,
                    protected_boundary,
                    span,
                    &query_keywords,
                );
                ScoredEntry {
                    index: i,
                    compressed,
                    score,
                    tokens,
                }
            })
            .collect();

        let compressed_tokens: u32 = entries.iter().map(|e| e.tokens).fold(0, u32::saturating_add);
        let mut running = system_tokens
            .saturating_add(protected_tokens)
            .saturating_add(compressed_tokens);

        let mut evicted: HashSet<usize> = HashSet::new();
        if running > usable {
            // Least relevant first; ties fall to the older message.
            let mut order: Vec<usize> = (0..entries.len()).collect();
            order.sort_by(|&a, &b| {
                entries[a]
                    .score
                    .partial_cmp(&entries[b].score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(entries[a].index.cmp(&entries[b].index))
            });
            for position in order {
                if running <= usable {
                    break;
                }
                running = running.saturating_sub(entries[position].tokens);
                evicted.insert(entries[position].index);
            }
            tracing::info!(
                evicted = evicted.len(),
                remaining_tokens = running,
                budget = usable,
                "evicted low-relevance messages to fit budget"
            );
        }

        if running > usable && protected_pairs > self.budget.min_protected_pair_count {
            // Even full eviction was not enough; shrink the protected window.
            return self.reduced_protection_pass(messages, usable);
        }

        entries.retain(|e| !evicted.contains(&e.index));

        let mut prepared: Vec<Message> = Vec::with_capacity(messages.len());
        let mut entry_iter = entries.into_iter().peekable();
        let mut prev_evicted = false;
        for (i, message) in messages.iter().enumerate() {
            if evicted.contains(&i) {
                if !prev_evicted {
                    prepared.push(Message::user(EVICTION_PLACEHOLDER));
                }
                prev_evicted = true;
                continue;
            }
            prev_evicted = false;
            if entry_iter.peek().is_some_and(|e| e.index == i) {
                prepared.push(entry_iter.next().map(|e| e.compressed).unwrap_or_else(|| message.clone()));
            } else {
                prepared.push(message.clone());
            }
        }

        let usage = ContextUsage {
            system_tokens,
            protected_tokens,
            compressible_tokens: running
                .saturating_sub(system_tokens)
                .saturating_sub(protected_tokens),
            total_tokens: running,
            budget_limit: usable,
            messages_evicted: evicted.len(),
            messages_compressed: compressible.len() - evicted.len(),
        };
        (prepared, usage)
    }

    /// Reduced-protection fallback: shrink the protected window to the
    /// minimum, then keep compressed older messages newest-first while the
    /// running total stays under budget. Older overflow is dropped silently.
    fn reduced_protection_pass(
        &self,
        messages: &[Message],
        usable: u32,
    ) -> (Vec<Message>, ContextUsage) {
        let protected_count = self.budget.min_protected_pair_count * 2;
        let (system_indices, protected_set, compressible) = partition(messages, protected_count);

        let system_tokens: u32 = system_indices
            .iter()
            .map(|&i| self.estimator.estimate_message(&messages[i]))
            .fold(0, u32::saturating_add);
        let protected_tokens: u32 = protected_set
            .iter()
            .map(|&i| self.estimator.estimate_message(&messages[i]))
            .fold(0, u32::saturating_add);

        let mut running = system_tokens.saturating_add(protected_tokens);
        let mut kept: Vec<(usize, Message)> = Vec::new();
        let mut dropped = 0usize;
        let mut over_budget = false;

        for &i in compressible.iter().rev() {
            if over_budget {
                dropped += 1;
                continue;
            }
            let compressed = compress_message(&messages[i]);
            let tokens = self.estimator.estimate_message(&compressed);
            if running.saturating_add(tokens) > usable {
                over_budget = true;
                dropped += 1;
                continue;
            }
            running = running.saturating_add(tokens);
            kept.push((i, compressed));
        }

        if dropped > 0 {
            tracing::warn!(
                dropped,
                kept = kept.len(),
                "reduced-protection fallback dropped older messages"
            );
        }

        kept.sort_by_key(|(i, _)| *i);
        let mut kept_iter = kept.into_iter().peekable();
        let mut prepared: Vec<Message> = Vec::with_capacity(messages.len());
        for (i, message) in messages.iter().enumerate() {
            if system_indices.contains(&i) || protected_set.contains(&i) {
                prepared.push(message.clone());
            } else if kept_iter.peek().is_some_and(|(k, _)| *k == i) {
                if let Some((_, compressed)) = kept_iter.next() {
                    prepared.push(compressed);
                }
            }
            // Anything else was dropped silently.
        }

        let kept_count = prepared.len() - system_indices.len() - protected_set.len();
        let usage = ContextUsage {
            system_tokens,
            protected_tokens,
            compressible_tokens: running
                .saturating_sub(system_tokens)
                .saturating_sub(protected_tokens),
            total_tokens: running,
            budget_limit: usable,
            messages_evicted: dropped,
            messages_compressed: kept_count,
        };
        (prepared, usage)
    }

    fn passthrough_usage(&self, messages: &[Message], usable: u32) -> ContextUsage {
        let total = self.estimator.estimate_messages(messages);
        ContextUsage {
            system_tokens: 0,
            protected_tokens: 0,
            compressible_tokens: 0,
            total_tokens: total,
            budget_limit: usable,
            messages_evicted: 0,
            messages_compressed: 0,
        }
    }
}

/// Split message indices into system, protected tail, and compressible.
fn partition(
    messages: &[Message],
    protected_count: usize,
) -> (HashSet<usize>, HashSet<usize>, Vec<usize>) {
    let system_indices: HashSet<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::System)
        .map(|(i, _)| i)
        .collect();

    let non_system: Vec<usize> = (0..messages.len())
        .filter(|i| !system_indices.contains(i))
        .collect();

    let protected_set: HashSet<usize> = non_system
        .iter()
        .rev()
        .take(protected_count)
        .copied()
        .collect();

    let compressible: Vec<usize> = non_system
        .iter()
        .filter(|i| !protected_set.contains(i))
        .copied()
        .collect();

    (system_indices, protected_set, compressible)
}

/// Compress every segment of a message independently. A message stripped of
/// all segments gets a single placeholder so it is never empty.
fn compress_message(message: &Message) -> Message {
    let mut content: Vec<ContentSegment> = message
        .content
        .iter()
        .filter_map(compress_segment)
        .collect();
    if content.is_empty() {
        content.push(ContentSegment::text(EMPTY_MESSAGE_PLACEHOLDER));
    }
    Message {
        id: message.id.clone(),
        role: message.role,
        content,
        created_at: message.created_at,
        conversation_id: message.conversation_id.clone(),
    }
}
