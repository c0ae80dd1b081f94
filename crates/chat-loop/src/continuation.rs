//! Automatic continuation of length-truncated responses.
//!
//! When a response stops with `MaxTokens`, the model is asked to resume
//! where it left off, up to a bounded number of follow-up rounds. Each
//! follow-up sees the merged content so far as its own assistant turn;
//! tools are withheld so continuation stays pure text.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_core::{AgentEvent, ChatRequest, Message, ModelClient, StopReason, StreamResult};

use crate::config::LoopConfig;
use crate::stream::consume_model_stream;

/// User-turn instruction sent with each continuation request.
pub const CONTINUATION_INSTRUCTION: &str =
    "Continue exactly where you left off. Do not repeat content. Do not add a preamble.";

/// Extend a truncated result in place until the model finishes naturally
/// or the round budget runs out. Anything other than `MaxTokens` returns
/// the result untouched.
pub async fn continue_if_truncated(
    client: &dyn ModelClient,
    base_request: &ChatRequest,
    mut result: StreamResult,
    config: &LoopConfig,
    event_tx: &mpsc::Sender<AgentEvent>,
    cancel_token: &CancellationToken,
) -> StreamResult {
    if !config.auto_continue {
        return result;
    }

    let mut round = 0usize;
    while result.stop_reason == StopReason::MaxTokens && round < config.max_continuation_rounds {
        if cancel_token.is_cancelled() {
            result.stop_reason = StopReason::Cancelled;
            return result;
        }
        round += 1;
        log::info!(
            "response truncated, continuation round {} of {}",
            round,
            config.max_continuation_rounds
        );

        let mut messages = base_request.messages.clone();
        messages.push(Message::assistant(result.content.clone()));
        messages.push(Message::user(CONTINUATION_INSTRUCTION));

        let request = ChatRequest {
            messages,
            tools: Vec::new(),
            ..base_request.clone()
        };

        let stream = match client.stream_chat(&request).await {
            Ok(stream) => stream,
            Err(error) if error.is_cancelled() => {
                result.stop_reason = StopReason::Cancelled;
                return result;
            }
            Err(error) => {
                // The truncated content is still useful; keep it.
                log::warn!("continuation request failed: {error}");
                let _ = event_tx
                    .send(AgentEvent::Error {
                        message: format!("Continuation failed: {error}"),
                    })
                    .await;
                return result;
            }
        };

        let output = consume_model_stream(stream, event_tx, cancel_token).await;
        result.usage.merge(output.usage);
        result.content.extend(output.segments);
        result.stop_reason = output.stop_reason;

        // Tool invocations issued mid-continuation are not honored.
        if !output.tool_invocations.is_empty() {
            log::warn!(
                "ignoring {} tool invocation(s) issued during continuation",
                output.tool_invocations.len()
            );
        }

        match result.stop_reason {
            StopReason::Cancelled | StopReason::Error => return result,
            StopReason::EndTurn | StopReason::MaxTokens => {}
        }
    }

    result
}
