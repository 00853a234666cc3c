//! The provider/tool round-trip loop shared by agents and the request proxy.
//!
//! Each step sends the conversation to the provider. When the reply asks for
//! tools and steps remain, every call runs through the [`ToolExecutor`], the
//! assistant turn and tool results are appended, and the loop continues.

use tracing::{debug, warn};

use crate::error::Result;
use crate::message::Message;
use crate::pipeline::RuntimeHandlers;
use crate::provider::{ChatProvider, ChatRequest, ChatResponse};
use crate::retry::{RetryConfig, retry_async};
use crate::stream::StopReason;
use crate::tool::{SharedTool, ToolCallRecord, ToolContext, ToolExecutor};
use crate::usage::Usage;

/// What a finished loop hands back.
#[derive(Debug, Clone)]
pub(crate) struct StepOutcome {
    /// The final provider response.
    pub response: ChatResponse,
    /// The conversation as sent, plus the final assistant turn.
    pub messages: Vec<Message>,
    /// Every tool call executed along the way.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Provider turns taken.
    pub steps: u32,
    /// Usage summed over all turns.
    pub usage: Usage,
}

/// Borrowed inputs for one run of the loop.
pub(crate) struct StepRunner<'a> {
    pub provider: &'a dyn ChatProvider,
    pub executor: &'a ToolExecutor,
    pub tools: &'a [SharedTool],
    pub context: &'a ToolContext,
    pub runtime: &'a RuntimeHandlers,
    pub max_steps: u32,
    pub retry: Option<&'a RetryConfig>,
}

impl StepRunner<'_> {
    /// Drive `request` to a final answer or until steps run out.
    ///
    /// Running out of steps is not an error: the last response is returned
    /// with [`StopReason::ToolCalls`].
    pub(crate) async fn run(&self, mut request: ChatRequest) -> Result<StepOutcome> {
        let max_steps = self.max_steps.max(1);
        let mut usage = Usage::zero();
        let mut records = Vec::new();
        let mut step = 0;

        loop {
            step += 1;
            debug!(step, max_steps, messages = request.messages.len(), "provider turn");

            let response = self.call(&request).await?;
            if let Some(turn) = response.usage {
                usage += turn;
            }
            request.messages.push(response.message.clone());

            let calls = match response.tool_calls() {
                Some(calls) if !calls.is_empty() => calls.to_vec(),
                _ => {
                    return Ok(StepOutcome {
                        response,
                        messages: request.messages,
                        tool_calls: records,
                        steps: step,
                        usage,
                    });
                }
            };

            if step >= max_steps {
                warn!(steps = step, pending = calls.len(), "step limit reached with tool calls pending");
                return Ok(StepOutcome {
                    response: response.with_stop_reason(StopReason::ToolCalls),
                    messages: request.messages,
                    tool_calls: records,
                    steps: step,
                    usage,
                });
            }

            for call in &calls {
                let execution = self
                    .executor
                    .execute(self.tools, call, self.context, self.runtime)
                    .await?;
                let record = ToolCallRecord::from(execution);
                request
                    .messages
                    .push(Message::tool(record.id.clone(), record.result.to_text()));
                records.push(record);
            }
        }
    }

    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match self.retry {
            Some(config) => retry_async(config, || self.provider.chat(request)).await,
            None => self.provider.chat(request).await,
        }
    }
}

impl std::fmt::Debug for StepRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("provider", &self.provider.provider_name())
            .field("tools", &self.tools.len())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}
