//! The tool-continuation engine.
//!
//! Drives bounded rounds of "model speaks → tools execute → model
//! continues". Tools run sequentially in request order with a cancellation
//! check between calls; each raw result is compressed before it re-enters
//! the transcript; the circuit breaker stops futile identical retries.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_context::compress_tool_result;
use chat_core::{
    AgentEvent, ChatRequest, ContentSegment, Message, ModelClient, StopReason, StreamResult,
    TokenUsage, ToolExecutor, ToolResult,
};

use crate::breaker::{CircuitBreaker, STOP_HINT};
use crate::config::LoopConfig;
use crate::stream::consume_model_stream;

/// Run the continuation loop until the model stops requesting tools, a
/// terminal condition is hit, or the depth ceiling is reached.
///
/// Cancellation is never an error: the caller gets partial accumulated
/// content with `StopReason::Cancelled`.
pub async fn run_continuation(
    client: &dyn ModelClient,
    tools: &dyn ToolExecutor,
    base_request: &ChatRequest,
    config: &LoopConfig,
    event_tx: &mpsc::Sender<AgentEvent>,
    cancel_token: &CancellationToken,
) -> StreamResult {
    let mut transcript = base_request.messages.clone();
    let mut accumulated: Vec<ContentSegment> = Vec::new();
    let mut usage = TokenUsage::default();
    let mut breaker = CircuitBreaker::new();
    let mut last_stop = StopReason::EndTurn;

    for depth in 0..config.max_tool_depth {
        if cancel_token.is_cancelled() {
            return finish(accumulated, usage, StopReason::Cancelled);
        }

        if depth > 0 && !inter_round_delay(depth, config, cancel_token).await {
            return finish(accumulated, usage, StopReason::Cancelled);
        }

        log::debug!(
            "continuation round {} of {}, transcript {} messages",
            depth + 1,
            config.max_tool_depth,
            transcript.len()
        );

        let request = ChatRequest {
            messages: transcript.clone(),
            ..base_request.clone()
        };
        let stream = match client.stream_chat(&request).await {
            Ok(stream) => stream,
            Err(error) if error.is_cancelled() => {
                return finish(accumulated, usage, StopReason::Cancelled);
            }
            Err(error) => {
                let message = format!("Request failed: {error}");
                let _ = event_tx
                    .send(AgentEvent::Error {
                        message: message.clone(),
                    })
                    .await;
                accumulated.push(ContentSegment::text(format!("[{message}]")));
                return finish(accumulated, usage, StopReason::Error);
            }
        };

        let output = consume_model_stream(stream, event_tx, cancel_token).await;
        usage.merge(output.usage);
        accumulated.extend(output.segments.iter().cloned());
        last_stop = output.stop_reason;

        match output.stop_reason {
            StopReason::Cancelled => return finish(accumulated, usage, StopReason::Cancelled),
            StopReason::Error => return finish(accumulated, usage, StopReason::Error),
            StopReason::EndTurn | StopReason::MaxTokens => {}
        }

        if output.tool_invocations.is_empty() {
            return finish(accumulated, usage, last_stop);
        }

        let mut results: Vec<ToolResult> = Vec::with_capacity(output.tool_invocations.len());
        let mut any_success = false;

        for invocation in &output.tool_invocations {
            if cancel_token.is_cancelled() {
                return finish(accumulated, usage, StopReason::Cancelled);
            }

            if breaker.should_skip(invocation) {
                log::warn!(
                    "skipping tool '{}': identical input already failed repeatedly",
                    invocation.name
                );
                results.push(ToolResult::error(
                    invocation.id.clone(),
                    format!(
                        "Skipped: '{}' already failed repeatedly with this input",
                        invocation.name
                    ),
                ));
                continue;
            }

            let _ = event_tx
                .send(AgentEvent::ToolStart {
                    tool_invocation_id: invocation.id.clone(),
                    tool_name: invocation.name.clone(),
                    arguments: invocation.input.clone(),
                })
                .await;

            let raw = tools.execute(invocation).await;
            let content = compress_tool_result(
                &raw.content,
                Some(&invocation.name),
                config.tool_result_cap_chars,
            );
            let result = ToolResult {
                tool_invocation_id: invocation.id.clone(),
                content,
                is_error: raw.is_error,
            };

            if result.is_error {
                breaker.record_failure(invocation);
            } else {
                any_success = true;
            }

            let _ = event_tx
                .send(AgentEvent::ToolComplete {
                    tool_invocation_id: invocation.id.clone(),
                    result: result.clone(),
                })
                .await;
            results.push(result);
        }

        if cancel_token.is_cancelled() {
            return finish(accumulated, usage, StopReason::Cancelled);
        }

        breaker.finish_round(any_success);
        if breaker.stop_hint_tripped() {
            // Advisory: the depth ceiling remains the hard stop.
            if let Some(last) = results.last_mut() {
                last.content.push_str("\n\n");
                last.content.push_str(STOP_HINT);
            }
        }

        let mut assistant_content = output.segments;
        assistant_content.extend(
            output
                .tool_invocations
                .into_iter()
                .map(ContentSegment::ToolInvocation),
        );
        transcript.push(Message::assistant(assistant_content));
        transcript.push(Message::tool_results(results));
    }

    log::warn!(
        "tool depth limit ({}) reached, returning accumulated content",
        config.max_tool_depth
    );
    finish(accumulated, usage, last_stop)
}

fn finish(content: Vec<ContentSegment>, usage: TokenUsage, stop_reason: StopReason) -> StreamResult {
    StreamResult {
        stop_reason,
        usage,
        content,
        tool_invocations: Vec::new(),
    }
}

/// Capped linear backoff between rounds. Returns false when cancelled.
async fn inter_round_delay(
    depth: usize,
    config: &LoopConfig,
    cancel_token: &CancellationToken,
) -> bool {
    let delay = config
        .round_delay_base
        .saturating_mul(depth as u32)
        .min(config.round_delay_max);
    if delay.is_zero() {
        return !cancel_token.is_cancelled();
    }
    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;

    use chat_core::{EngineError, ModelStream, StreamEvent, ToolInvocation, ToolSchema};

    use super::*;

    fn fast_config() -> LoopConfig {
        LoopConfig {
            round_delay_base: Duration::ZERO,
            ..LoopConfig::default()
        }
    }

    fn done_event() -> Result<StreamEvent, EngineError> {
        Ok(StreamEvent::Done {
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }

    fn text_event(text: &str) -> Result<StreamEvent, EngineError> {
        Ok(StreamEvent::Text {
            text: text.to_string(),
        })
    }

    fn invocation_event(id: &str, name: &str, input: serde_json::Value) -> Result<StreamEvent, EngineError> {
        Ok(StreamEvent::ToolInvocation(ToolInvocation::new(
            id, name, input,
        )))
    }

    /// Plays back one scripted stream per request, recording requests.
    struct ScriptedClient {
        scripts: Mutex<VecDeque<Vec<Result<StreamEvent, EngineError>>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(scripts: Vec<Vec<Result<StreamEvent, EngineError>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn stream_chat(&self, request: &ChatRequest) -> Result<ModelStream, EngineError> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![done_event()]);
            Ok(Box::pin(stream::iter(script)))
        }
    }

    /// Requests one fresh tool invocation on every round, forever.
    struct InsatiableClient {
        counter: AtomicUsize,
        requests: AtomicUsize,
    }

    impl InsatiableClient {
        fn new() -> Self {
            Self {
                counter: AtomicUsize::new(0),
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for InsatiableClient {
        async fn stream_chat(&self, _request: &ChatRequest) -> Result<ModelStream, EngineError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter(vec![
                invocation_event(&format!("call_{n}"), "probe", json!({ "n": n })),
                done_event(),
            ])))
        }
    }

    struct RecordingExecutor {
        fail: bool,
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl RecordingExecutor {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, invocation: &ToolInvocation) -> ToolResult {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.fail {
                ToolResult::error(invocation.id.clone(), "tool exploded")
            } else {
                ToolResult::ok(invocation.id.clone(), "tool output")
            }
        }

        fn list_tools(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
    }

    fn base_request() -> ChatRequest {
        let mut request = ChatRequest::new("testing", "test-model");
        request.messages = vec![Message::user("do the thing")];
        request
    }

    /// Last tool-result content carried by a request's trailing user turn.
    fn trailing_tool_result_contents(request: &ChatRequest) -> Vec<String> {
        let last = request.messages.last().expect("request has messages");
        last.content
            .iter()
            .filter_map(|segment| match segment {
                ContentSegment::ToolResult(result) => Some(result.content.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn returns_content_when_no_tools_requested() {
        let client = ScriptedClient::new(vec![vec![text_event("plain answer"), done_event()]]);
        let tools = RecordingExecutor::new(false);
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.stop_reason, StopReason::EndTurn);
        assert_eq!(result.content, vec![ContentSegment::text("plain answer")]);
        assert_eq!(client.request_count(), 1);
        assert_eq!(tools.call_count(), 0);
    }

    #[tokio::test]
    async fn executes_tools_then_continues_with_results() {
        let client = ScriptedClient::new(vec![
            vec![
                invocation_event("call_1", "search", json!({"query": "x"})),
                done_event(),
            ],
            vec![text_event("final answer"), done_event()],
        ]);
        let tools = RecordingExecutor::new(false);
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.stop_reason, StopReason::EndTurn);
        assert_eq!(result.content, vec![ContentSegment::text("final answer")]);
        assert_eq!(tools.call_count(), 1);
        assert_eq!(client.request_count(), 2);

        // The continuation request carries an assistant turn with the
        // invocation and a user turn with the compressed result.
        let continuation = client.request(1);
        let n = continuation.messages.len();
        assert!(continuation.messages[n - 2]
            .content
            .iter()
            .any(|s| matches!(s, ContentSegment::ToolInvocation(_))));
        assert_eq!(
            trailing_tool_result_contents(&continuation),
            vec!["tool output".to_string()]
        );

        // Usage summed across both rounds.
        assert_eq!(result.usage.output_tokens, 40);
    }

    #[tokio::test]
    async fn tool_results_keep_request_order() {
        let client = ScriptedClient::new(vec![
            vec![
                invocation_event("call_a", "first", json!({})),
                invocation_event("call_b", "second", json!({})),
                done_event(),
            ],
            vec![text_event("done"), done_event()],
        ]);
        let tools = RecordingExecutor::new(false);
        let (event_tx, _rx) = mpsc::channel(256);

        run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].id, "call_b");

        let continuation = client.request(1);
        let last = continuation.messages.last().unwrap();
        let ids: Vec<&str> = last
            .content
            .iter()
            .filter_map(|s| match s {
                ContentSegment::ToolResult(r) => Some(r.tool_invocation_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
    }

    #[tokio::test]
    async fn failed_identity_is_never_reissued() {
        // Same (name, input) identity requested three rounds in a row; the
        // executor fails every call. Round three must be skipped without
        // reaching the executor.
        let same = || invocation_event("call_n", "fetch", json!({"url": "https://a"}));
        let client = ScriptedClient::new(vec![
            vec![same(), done_event()],
            vec![same(), done_event()],
            vec![same(), done_event()],
            vec![text_event("giving up"), done_event()],
        ]);
        let tools = RecordingExecutor::new(true);
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(tools.call_count(), 2, "third round must skip the executor");
        assert_eq!(result.stop_reason, StopReason::EndTurn);

        // The skipped round still reported a synthetic result to the model.
        let fourth = client.request(3);
        let contents = trailing_tool_result_contents(&fourth);
        assert!(contents[0].contains("Skipped"));
    }

    #[tokio::test]
    async fn stop_hint_reaches_the_model_after_three_failing_rounds() {
        // Distinct inputs each round: no per-key skip, but three
        // consecutive all-failing rounds trip the global hint.
        let client = ScriptedClient::new(vec![
            vec![invocation_event("c1", "fetch", json!({"n": 1})), done_event()],
            vec![invocation_event("c2", "fetch", json!({"n": 2})), done_event()],
            vec![invocation_event("c3", "fetch", json!({"n": 3})), done_event()],
            vec![text_event("stopping"), done_event()],
        ]);
        let tools = RecordingExecutor::new(true);
        let (event_tx, _rx) = mpsc::channel(256);

        run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        let second = client.request(1);
        assert!(
            !trailing_tool_result_contents(&second)[0].contains(STOP_HINT),
            "hint must not appear before the threshold"
        );

        let fourth = client.request(3);
        let contents = trailing_tool_result_contents(&fourth);
        assert!(contents.last().unwrap().contains(STOP_HINT));
    }

    #[tokio::test]
    async fn depth_ceiling_always_terminates_the_loop() {
        let client = InsatiableClient::new();
        let tools = RecordingExecutor::new(false);
        let config = LoopConfig {
            max_tool_depth: 4,
            round_delay_base: Duration::ZERO,
            ..LoopConfig::default()
        };
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &client,
            &tools,
            &base_request(),
            &config,
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(client.requests.load(Ordering::SeqCst), 4);
        assert_eq!(tools.call_count(), 4);
        assert_eq!(result.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn pre_cancelled_token_returns_immediately() {
        let client = ScriptedClient::new(vec![vec![text_event("never"), done_event()]]);
        let tools = RecordingExecutor::new(false);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &client,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &cancel,
        )
        .await;

        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert!(result.content.is_empty());
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn transport_failure_yields_error_with_note() {
        struct FailingClient;

        #[async_trait]
        impl ModelClient for FailingClient {
            async fn stream_chat(&self, _request: &ChatRequest) -> Result<ModelStream, EngineError> {
                Err(EngineError::Transport("upstream 503".to_string()))
            }
        }

        let tools = RecordingExecutor::new(false);
        let (event_tx, _rx) = mpsc::channel(256);

        let result = run_continuation(
            &FailingClient,
            &tools,
            &base_request(),
            &fast_config(),
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.stop_reason, StopReason::Error);
        let note = match &result.content[0] {
            ContentSegment::Text { text } => text.clone(),
            other => panic!("unexpected segment: {other:?}"),
        };
        assert!(note.contains("upstream 503"));
    }

    #[tokio::test]
    async fn oversized_tool_output_is_compressed_before_reentry() {
        let client = ScriptedClient::new(vec![
            vec![
                invocation_event("call_1", "read_file", json!({"path": "big"})),
                done_event(),
            ],
            vec![text_event("ok"), done_event()],
        ]);

        struct HugeOutputExecutor;

        #[async_trait]
        impl ToolExecutor for HugeOutputExecutor {
            async fn execute(&self, invocation: &ToolInvocation) -> ToolResult {
                ToolResult::ok(invocation.id.clone(), "x".repeat(100_000))
            }

            fn list_tools(&self) -> Vec<ToolSchema> {
                Vec::new()
            }
        }

        let config = LoopConfig {
            tool_result_cap_chars: 2_000,
            round_delay_base: Duration::ZERO,
            ..LoopConfig::default()
        };
        let (event_tx, _rx) = mpsc::channel(256);

        run_continuation(
            &client,
            &HugeOutputExecutor,
            &base_request(),
            &config,
            &event_tx,
            &CancellationToken::new(),
        )
        .await;

        let continuation = client.request(1);
        let contents = trailing_tool_result_contents(&continuation);
        assert!(contents[0].chars().count() <= 2_000);
        assert!(contents[0].contains("[...truncated:"));
    }
}
