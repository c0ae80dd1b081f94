//! Composition root: one engine per agent, one `run_turn` per user turn.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_context::{ContextBudgetManager, TokenBudget};
use chat_core::{
    AgentEvent, ChatRequest, Message, ModelClient, ModelRouter, RouteRole, StreamResult,
    ToolExecutor,
};

use crate::config::LoopConfig;
use crate::continuation::continue_if_truncated;
use crate::runner::run_continuation;

/// Ties the collaborators together and drives one turn at a time.
///
/// The engine holds no conversation state; the host owns the transcript
/// and passes it in whole on every turn.
pub struct AgentEngine {
    client: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    router: Arc<dyn ModelRouter>,
    context: ContextBudgetManager,
    config: LoopConfig,
}

impl AgentEngine {
    pub fn new(
        client: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        router: Arc<dyn ModelRouter>,
    ) -> Self {
        Self {
            client,
            tools,
            router,
            context: ContextBudgetManager::new(TokenBudget::default()),
            config: LoopConfig::default(),
        }
    }

    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.context = ContextBudgetManager::new(budget);
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one full turn against the supplied transcript.
    ///
    /// 1. Prepare the context within budget and report the breakdown.
    /// 2. Resolve the primary model route.
    /// 3. Run the tool-continuation loop.
    /// 4. Extend a length-truncated response.
    ///
    /// Never returns an error: faults and cancellation surface as the
    /// result's stop reason, with whatever content accumulated.
    pub async fn run_turn(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<AgentEvent>,
        cancel_token: CancellationToken,
    ) -> StreamResult {
        let (prepared, context_usage) = self.context.prepare(messages);
        let _ = event_tx
            .send(AgentEvent::ContextPrepared {
                usage: context_usage,
            })
            .await;

        let route = self.router.resolve(RouteRole::Primary, None);
        log::debug!(
            "running turn against {}/{} with {} messages",
            route.provider,
            route.model,
            prepared.len()
        );

        let mut request = ChatRequest::new(route.provider, route.model);
        request.messages = prepared;
        request.tools = self.tools.list_tools();
        request.additional_context = self.config.system_prompt.clone();
        request.max_tokens = Some(self.context.budget().response_reserve);

        let result = run_continuation(
            self.client.as_ref(),
            self.tools.as_ref(),
            &request,
            &self.config,
            &event_tx,
            &cancel_token,
        )
        .await;

        let result = continue_if_truncated(
            self.client.as_ref(),
            &request,
            result,
            &self.config,
            &event_tx,
            &cancel_token,
        )
        .await;

        let _ = event_tx
            .send(AgentEvent::Complete {
                usage: result.usage,
            })
            .await;
        result
    }
}
