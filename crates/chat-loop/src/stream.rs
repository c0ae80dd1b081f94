//! Consumes one model response stream into accumulated content.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_core::{
    AgentEvent, ContentSegment, EngineError, ModelStream, StopReason, StreamEvent, TokenUsage,
    ToolInvocation,
};

/// Malformed events tolerated before the stream is abandoned.
const MAX_PARSE_ERRORS: usize = 5;

#[derive(Debug)]
pub struct StreamOutput {
    pub segments: Vec<ContentSegment>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

/// Buffers incremental text/thinking deltas into whole segments.
#[derive(Default)]
struct SegmentAccumulator {
    segments: Vec<ContentSegment>,
    text_buffer: String,
    thinking_buffer: String,
}

impl SegmentAccumulator {
    fn push_text(&mut self, delta: &str) {
        self.flush_thinking();
        self.text_buffer.push_str(delta);
    }

    fn push_thinking(&mut self, delta: &str) {
        self.flush_text();
        self.thinking_buffer.push_str(delta);
    }

    fn push_segment(&mut self, segment: ContentSegment) {
        self.flush_text();
        self.flush_thinking();
        self.segments.push(segment);
    }

    fn flush_text(&mut self) {
        if !self.text_buffer.is_empty() {
            self.segments
                .push(ContentSegment::text(std::mem::take(&mut self.text_buffer)));
        }
    }

    fn flush_thinking(&mut self) {
        if !self.thinking_buffer.is_empty() {
            self.segments.push(ContentSegment::thinking(std::mem::take(
                &mut self.thinking_buffer,
            )));
        }
    }

    fn finish(mut self) -> Vec<ContentSegment> {
        self.flush_text();
        self.flush_thinking();
        self.segments
    }
}

/// Drain a model stream, forwarding progress events to the host channel.
///
/// Cancellation and transport faults both come back as a `StreamOutput`
/// with partial content and the matching stop reason; a lone malformed
/// event is skipped rather than aborting the stream.
pub async fn consume_model_stream(
    mut stream: ModelStream,
    event_tx: &mpsc::Sender<AgentEvent>,
    cancel_token: &CancellationToken,
) -> StreamOutput {
    let mut accumulator = SegmentAccumulator::default();
    let mut tool_invocations: Vec<ToolInvocation> = Vec::new();
    let mut stop_reason = StopReason::EndTurn;
    let mut usage = TokenUsage::default();
    let mut parse_errors = 0usize;

    loop {
        // The stream may stall indefinitely; cancellation must still win.
        let item = tokio::select! {
            _ = cancel_token.cancelled() => {
                stop_reason = StopReason::Cancelled;
                break;
            }
            item = stream.next() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match item {
            Ok(StreamEvent::Text { text }) => {
                accumulator.push_text(&text);
                let _ = event_tx.send(AgentEvent::Text { content: text }).await;
            }
            Ok(StreamEvent::Thinking { thinking }) => {
                accumulator.push_thinking(&thinking);
                let _ = event_tx
                    .send(AgentEvent::Thinking { content: thinking })
                    .await;
            }
            Ok(StreamEvent::ToolInvocation(invocation)) => {
                log::debug!(
                    "tool invocation requested: {} ({})",
                    invocation.name,
                    invocation.id
                );
                tool_invocations.push(invocation);
            }
            Ok(StreamEvent::ModeHint { hint }) => {
                accumulator.push_segment(ContentSegment::Other {
                    kind: format!("mode_hint:{hint}"),
                });
            }
            Ok(StreamEvent::VideoEmbed { url }) => {
                accumulator.push_segment(ContentSegment::Other {
                    kind: format!("video:{url}"),
                });
            }
            Ok(StreamEvent::Done {
                stop_reason: reason,
                usage: reported,
            }) => {
                stop_reason = reason;
                usage = reported;
            }
            Err(EngineError::Cancelled) => {
                stop_reason = StopReason::Cancelled;
                break;
            }
            Err(EngineError::Parse(detail)) => {
                parse_errors += 1;
                log::warn!("skipping malformed stream event: {detail}");
                if parse_errors > MAX_PARSE_ERRORS {
                    let _ = event_tx
                        .send(AgentEvent::Error {
                            message: "Stream produced repeated malformed events".to_string(),
                        })
                        .await;
                    stop_reason = StopReason::Error;
                    break;
                }
            }
            Err(error) => {
                let message = format!("Stream error: {error}");
                log::warn!("{message}");
                let _ = event_tx
                    .send(AgentEvent::Error {
                        message: message.clone(),
                    })
                    .await;
                accumulator.push_segment(ContentSegment::text(format!("[{message}]")));
                stop_reason = StopReason::Error;
                break;
            }
        }
    }

    StreamOutput {
        segments: accumulator.finish(),
        tool_invocations,
        stop_reason,
        usage,
    }
}
