//! Runs one agent call end to end.
//!
//! [`AgentExecutor::execute`] fires `agent.before_execute`, renders the
//! system prompt, resolves tools and the provider, builds the request from
//! agent settings and the [`ExecutionContext`], drives the tool loop and
//! fires `agent.after_execute`. Any failure goes through `agent.on_error`
//! before it is returned.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::atlas::Atlas;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::pipeline::{RuntimeHandlers, events};
use crate::provider::{ChatRequest, SharedChatProvider, StructuredResponse};
use crate::proxy::PendingRequest;
use crate::retry::{RetryConfig, retry_async};
use crate::schema::SchemaSpec;
use crate::stream::{ChatStream, StreamAggregator, StreamChunk};
use crate::tool::{SharedTool, ToolDefinition};

use super::definition::AgentDefinition;
use super::prompt::SystemPromptBuilder;
use super::response::{AgentResponse, ExecutionMode};
use super::runner::{StepOutcome, StepRunner};

/// Payload of `agent.before_execute` and `agent.after_execute`.
///
/// Before handlers may rewrite `input` and `context`. After handlers see
/// `response` set and may rewrite it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    /// Agent key.
    pub agent: String,
    /// User input.
    pub input: String,
    /// Per-call context.
    pub context: ExecutionContext,
    /// How the agent was invoked.
    pub mode: ExecutionMode,
    /// The response, once known.
    pub response: Option<AgentResponse>,
}

/// Payload of `agent.on_error`. Handlers may replace `error`.
#[derive(Debug)]
pub struct AgentFailure {
    /// Agent key.
    pub agent: String,
    /// User input.
    pub input: String,
    /// Per-call context.
    pub context: ExecutionContext,
    /// How the agent was invoked.
    pub mode: ExecutionMode,
    /// The error that will be returned.
    pub error: Error,
}

/// Payload of `agent.stream.on_chunk`. Handlers may rewrite the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunkPayload {
    /// Agent key.
    pub agent: String,
    /// Zero-based position in the stream.
    pub index: usize,
    /// The chunk about to be yielded.
    pub chunk: StreamChunk,
}

/// Per-call overrides applied on top of the agent definition.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Provider name.
    pub provider: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Output schema, replacing the agent's.
    pub schema: Option<SchemaSpec>,
    /// Extra system prompt sections.
    pub prompt: SystemPromptBuilder,
    /// Handlers for this call only.
    pub runtime: RuntimeHandlers,
}

/// Everything resolved before the first provider call.
struct Prepared {
    execution: AgentExecution,
    provider: SharedChatProvider,
    request: ChatRequest,
    tools: Vec<SharedTool>,
    max_steps: u32,
    retry: Option<RetryConfig>,
}

/// Executes agents against an [`Atlas`].
#[derive(Debug, Clone)]
pub struct AgentExecutor {
    atlas: Atlas,
}

impl AgentExecutor {
    /// Create an executor bound to `atlas`.
    #[must_use]
    pub const fn new(atlas: Atlas) -> Self {
        Self { atlas }
    }

    /// Run `agent` on `input` in chat or structured mode.
    ///
    /// # Errors
    ///
    /// Unknown tools or providers, provider failures, a missing schema in
    /// structured mode, invalid structured output and handler failures, each
    /// after `agent.on_error` ran.
    pub async fn execute(
        &self,
        agent: &dyn AgentDefinition,
        input: &str,
        context: ExecutionContext,
        mode: ExecutionMode,
        options: &ExecutionOptions,
    ) -> Result<AgentResponse> {
        let key = agent.key();
        let span = info_span!("atlas.agent", agent = %key, mode = ?mode);
        async move {
            let execution = AgentExecution {
                agent: key.clone(),
                input: input.to_owned(),
                context: context.clone(),
                mode,
                response: None,
            };
            match self.run(agent, execution, options).await {
                Ok(response) => Ok(response),
                Err(error) => Err(self
                    .fail(&key, input, context, mode, error, &options.runtime)
                    .await),
            }
        }
        .instrument(span)
        .await
    }

    /// Stream a single provider turn for `agent`.
    ///
    /// Each chunk passes through `agent.stream.on_chunk` before it is
    /// yielded. `agent.after_execute` runs once the stream is drained, with
    /// the aggregated response. Tool calls are streamed but not executed.
    ///
    /// # Errors
    ///
    /// Fails if preparation fails or the stream cannot be opened. Later
    /// failures are yielded as the final item.
    pub async fn stream(
        &self,
        agent: &dyn AgentDefinition,
        input: &str,
        context: ExecutionContext,
        options: &ExecutionOptions,
    ) -> Result<ChatStream> {
        let key = agent.key();
        let mode = ExecutionMode::Stream;
        let span = info_span!("atlas.agent", agent = %key, mode = ?mode);

        let opened = async {
            let execution = AgentExecution {
                agent: key.clone(),
                input: input.to_owned(),
                context: context.clone(),
                mode,
                response: None,
            };
            let mut prepared = self.prepare(agent, execution, options).await?;
            prepared.request.stream = true;
            let inner = match prepared.retry.as_ref() {
                Some(config) => {
                    retry_async(config, || prepared.provider.chat_stream(&prepared.request)).await?
                }
                None => prepared.provider.chat_stream(&prepared.request).await?,
            };
            info!(agent = %key, "agent stream opened");
            Ok::<_, Error>((prepared, inner))
        }
        .instrument(span)
        .await;

        let (prepared, mut inner) = match opened {
            Ok(opened) => opened,
            Err(error) => {
                return Err(self
                    .fail(&key, input, context, mode, error, &options.runtime)
                    .await);
            }
        };

        let executor = self.clone();
        let runtime = options.runtime.clone();
        let input = input.to_owned();
        Ok(Box::pin(async_stream::stream! {
            let mut aggregator = StreamAggregator::new();
            let mut index = 0;
            while let Some(item) = inner.next().await {
                let payload = match item {
                    Ok(chunk) => StreamChunkPayload { agent: key.clone(), index, chunk },
                    Err(error) => {
                        yield Err(executor.fail(&key, &input, context.clone(), mode, error, &runtime).await);
                        return;
                    }
                };
                match executor.atlas.runner().run_with(events::AGENT_STREAM_ON_CHUNK, payload, &runtime).await {
                    Ok(payload) => {
                        aggregator.apply(&payload.chunk);
                        index += 1;
                        yield Ok(payload.chunk);
                    }
                    Err(error) => {
                        yield Err(executor.fail(&key, &input, context.clone(), mode, error, &runtime).await);
                        return;
                    }
                }
            }

            debug!(agent = %key, chunks = index, "agent stream drained");
            let response = aggregator.into_chat_response();
            let metadata = prepared.execution.context.metadata().clone();
            let outcome = StepOutcome {
                usage: response.usage.unwrap_or_default(),
                messages: {
                    let mut messages = prepared.request.messages.clone();
                    messages.push(response.message.clone());
                    messages
                },
                response,
                tool_calls: Vec::new(),
                steps: 1,
            };
            let response = match build_response(&key, mode, outcome, metadata) {
                Ok(response) => response,
                Err(error) => {
                    yield Err(executor.fail(&key, &input, context.clone(), mode, error, &runtime).await);
                    return;
                }
            };
            let mut execution = prepared.execution;
            execution.response = Some(response);
            if let Err(error) = executor.after(execution, &runtime).await {
                yield Err(executor.fail(&key, &input, context, mode, error, &runtime).await);
            }
        }))
    }

    async fn run(
        &self,
        agent: &dyn AgentDefinition,
        execution: AgentExecution,
        options: &ExecutionOptions,
    ) -> Result<AgentResponse> {
        let prepared = self.prepare(agent, execution, options).await?;
        let Prepared {
            mut execution,
            provider,
            request,
            tools,
            max_steps,
            retry,
        } = prepared;

        let tool_context = execution.context.tool_context(&execution.agent);
        let outcome = StepRunner {
            provider: provider.as_ref(),
            executor: self.atlas.tool_executor(),
            tools: &tools,
            context: &tool_context,
            runtime: &options.runtime,
            max_steps,
            retry: retry.as_ref(),
        }
        .run(request)
        .await?;

        info!(
            steps = outcome.steps,
            tool_calls = outcome.tool_calls.len(),
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            "agent execution completed"
        );

        let metadata = execution.context.metadata().clone();
        execution.response = Some(build_response(&execution.agent, execution.mode, outcome, metadata)?);
        self.after(execution, &options.runtime).await
    }

    async fn prepare(
        &self,
        agent: &dyn AgentDefinition,
        execution: AgentExecution,
        options: &ExecutionOptions,
    ) -> Result<Prepared> {
        let runner = self.atlas.runner();
        let execution = runner
            .run_with(events::AGENT_BEFORE_EXECUTE, execution, &options.runtime)
            .await?;

        let template = agent.system_prompt();
        let system_prompt = if template.is_some() || !options.prompt.section_titles().is_empty() {
            Some(
                options
                    .prompt
                    .build(
                        runner,
                        &options.runtime,
                        &execution.agent,
                        template.unwrap_or_default(),
                        &execution.context,
                    )
                    .await?,
            )
        } else {
            None
        };

        let pending = self.pending_request(agent, &execution, system_prompt, options);
        if execution.mode == ExecutionMode::Structured && pending.schema.is_none() {
            return Err(Error::agent(format!(
                "agent `{}` has no output schema",
                execution.agent
            )));
        }

        let tools = self.atlas.tools().only(&pending.tools)?;
        let definitions: Vec<ToolDefinition> = tools.iter().map(|t| t.definition()).collect();
        let (provider, model) = self
            .atlas
            .resolve_chat(pending.provider.as_deref(), pending.model.as_deref())?;
        debug!(
            provider = provider.provider_name(),
            model = %model,
            tools = tools.len(),
            "agent request resolved"
        );

        let request = pending
            .to_chat_request(&model, definitions)
            .with_metadata(ChatRequest::AGENT_KEY, execution.agent.clone());
        let config = self.atlas.config();
        Ok(Prepared {
            max_steps: pending.max_steps.unwrap_or(config.agents.max_steps),
            retry: pending.retry.or_else(|| config.retry.clone()),
            execution,
            provider,
            request,
            tools,
        })
    }

    /// Agent settings, then replayed context calls, then per-call overrides.
    fn pending_request(
        &self,
        agent: &dyn AgentDefinition,
        execution: &AgentExecution,
        system_prompt: Option<String>,
        options: &ExecutionOptions,
    ) -> PendingRequest {
        let defaults = &self.atlas.config().agents;
        let mut messages = execution.context.messages().to_vec();
        if !execution.input.is_empty() {
            messages.push(Message::user(execution.input.clone()));
        }

        let mut pending = PendingRequest {
            provider: agent.provider().map(str::to_owned),
            model: agent.model().map(str::to_owned),
            system_prompt,
            messages,
            max_tokens: agent.max_tokens().or(defaults.max_tokens),
            temperature: agent.temperature().or(defaults.temperature),
            tools: agent.tools(),
            schema: agent.schema(),
            provider_options: agent.provider_options(),
            max_steps: agent.max_steps(),
            ..PendingRequest::default()
        };
        pending.apply_all(execution.context.request_calls());

        if let Some(provider) = &options.provider {
            pending.provider = Some(provider.clone());
        }
        if let Some(model) = &options.model {
            pending.model = Some(model.clone());
        }
        if let Some(schema) = &options.schema {
            pending.schema = Some(schema.clone());
        }
        if execution.mode != ExecutionMode::Structured {
            pending.schema = None;
        }
        pending
    }

    async fn after(&self, execution: AgentExecution, runtime: &RuntimeHandlers) -> Result<AgentResponse> {
        let agent = execution.agent.clone();
        self.atlas
            .runner()
            .run_with(events::AGENT_AFTER_EXECUTE, execution, runtime)
            .await?
            .response
            .ok_or_else(|| Error::pipeline(
                events::AGENT_AFTER_EXECUTE,
                format!("handlers removed the response of agent `{agent}`"),
            ))
    }

    async fn fail(
        &self,
        agent: &str,
        input: &str,
        context: ExecutionContext,
        mode: ExecutionMode,
        error: Error,
        runtime: &RuntimeHandlers,
    ) -> Error {
        warn!(agent, error = %error, "agent execution failed");
        let failure = AgentFailure {
            agent: agent.to_owned(),
            input: input.to_owned(),
            context,
            mode,
            error,
        };
        match self
            .atlas
            .runner()
            .run_with(events::AGENT_ON_ERROR, failure, runtime)
            .await
        {
            Ok(failure) => failure.error,
            Err(handler_error) => handler_error,
        }
    }
}

fn build_response(
    agent: &str,
    mode: ExecutionMode,
    outcome: StepOutcome,
    metadata: Map<String, Value>,
) -> Result<AgentResponse> {
    let text = outcome.response.text();
    let structured = if mode == ExecutionMode::Structured {
        Some(StructuredResponse::from_response(outcome.response.clone())?.structured)
    } else {
        None
    };
    Ok(AgentResponse {
        agent: agent.to_owned(),
        text,
        structured,
        tool_calls: outcome.tool_calls,
        usage: outcome.usage,
        steps: outcome.steps,
        stop_reason: outcome.response.stop_reason,
        metadata,
        messages: outcome.messages,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::agent::Agent;
    use crate::error::{ProviderError, ToolError};
    use crate::pipeline::handler_fn;
    use crate::proxy::RequestCall;
    use crate::schema::Schema;
    use crate::testing::{AtlasFake, FakeResponse, FakeResponseSequence};
    use crate::tool::{Tool, ToolContext};

    #[derive(Deserialize)]
    struct LookupArgs {
        order: u32,
    }

    struct LookupOrder;

    #[async_trait]
    impl Tool for LookupOrder {
        const NAME: &'static str = "lookup_order";
        type Args = LookupArgs;
        type Output = String;
        type Error = ToolError;

        fn description(&self) -> String {
            "Look up an order".into()
        }

        async fn call(&self, args: LookupArgs, ctx: &ToolContext) -> std::result::Result<String, ToolError> {
            let user = ctx.value("user_id").map(ToString::to_string).unwrap_or_default();
            Ok(format!("order {} for user {user} shipped", args.order))
        }
    }

    fn atlas() -> (Atlas, AtlasFake) {
        let atlas = Atlas::builder()
            .agent(
                Agent::new("support")
                    .system_prompt("You help {user_name}.")
                    .tool("lookup_order")
                    .temperature(0.2),
            )
            .agent(
                Agent::new("extractor")
                    .schema(Schema::object("city", "A city").string("name", "City name")),
            )
            .tool(LookupOrder)
            .build()
            .unwrap();
        let fake = atlas.fake();
        (atlas, fake)
    }

    mod chat {
        use super::*;

        #[tokio::test]
        async fn renders_the_prompt_and_tags_the_request() {
            let (atlas, fake) = atlas();
            let fake = fake.respond_with(FakeResponse::text("Hi Ada"));

            let response = atlas
                .agent("support")
                .unwrap()
                .with_variable("user_name", "Ada")
                .chat("Hello")
                .await
                .unwrap();

            assert_eq!(response.text(), "Hi Ada");
            assert_eq!(response.agent, "support");
            assert_eq!(response.steps, 1);
            fake.assert_agent_called("support");
            let recorded = fake.recorded();
            assert_eq!(recorded[0].system_prompt(), Some("You help Ada."));
            assert_eq!(recorded[0].prompt(), Some("Hello"));
            let request = recorded[0].chat().unwrap();
            assert_eq!(request.temperature, Some(0.2));
            assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        }

        #[tokio::test]
        async fn runs_tools_with_context_metadata() {
            let (atlas, fake) = atlas();
            let fake = fake.sequence(
                FakeResponseSequence::new()
                    .then(FakeResponse::tool_call("lookup_order", json!({"order": 42})))
                    .then(FakeResponse::text("It shipped.")),
            );

            let response = atlas
                .agent("support")
                .unwrap()
                .with_metadata_value("user_id", 7)
                .chat("Where is order 42?")
                .await
                .unwrap();

            assert_eq!(response.text(), "It shipped.");
            assert_eq!(response.steps, 2);
            assert!(response.has_tool_calls());
            assert_eq!(response.tool_calls[0].result.to_text(), "order 42 for user 7 shipped");
            assert_eq!(response.metadata["user_id"], json!(7));
            fake.assert_called_times(2);
        }

        #[tokio::test]
        async fn context_calls_sit_between_agent_and_call_overrides() {
            let (atlas, fake) = atlas();
            atlas
                .agent("support")
                .unwrap()
                .with_call(RequestCall::WithMaxTokens(64))
                .with_call(RequestCall::WithModel("from-context".into()))
                .with_model("from-call")
                .chat("hi")
                .await
                .unwrap();

            let recorded = fake.recorded();
            assert_eq!(recorded[0].model(), "from-call");
            assert_eq!(recorded[0].chat().unwrap().max_tokens, Some(64));
        }

        #[tokio::test]
        async fn per_agent_sequences() {
            let (atlas, fake) = atlas();
            let _fake = fake
                .respond_with(FakeResponse::text("default"))
                .for_agent("support", FakeResponseSequence::new().then(FakeResponse::text("support only")));

            let support = atlas.agent("support").unwrap().chat("a").await.unwrap();
            let other = atlas.agent_with(Agent::new("other")).chat("b").await.unwrap();
            assert_eq!(support.text(), "support only");
            assert_eq!(other.text(), "default");
        }

        #[tokio::test]
        async fn sections_extend_the_prompt() {
            let (atlas, fake) = atlas();
            atlas
                .agent_with(Agent::new("plain"))
                .with_section("Rules", "Be brief.")
                .chat("hi")
                .await
                .unwrap();
            assert_eq!(fake.recorded()[0].system_prompt(), Some("## Rules\nBe brief."));
        }
    }

    mod structured {
        use super::*;

        #[tokio::test]
        async fn decodes_against_the_schema() {
            let (atlas, fake) = atlas();
            let _fake = fake.respond_with(FakeResponse::structured(json!({"name": "Lyon"})));

            let response = atlas.agent("extractor").unwrap().structured("Where?").await.unwrap();
            assert_eq!(response.structured, Some(json!({"name": "Lyon"})));

            #[derive(Deserialize)]
            struct City {
                name: String,
            }
            assert_eq!(response.parse::<City>().unwrap().name, "Lyon");
        }

        #[tokio::test]
        async fn missing_schema_fails_before_the_provider() {
            let (atlas, fake) = atlas();
            let err = atlas.agent("support").unwrap().structured("x").await.unwrap_err();
            assert!(matches!(err, Error::Agent(_)));
            fake.assert_nothing_called();
        }

        #[tokio::test]
        async fn chat_mode_drops_the_schema() {
            let (atlas, fake) = atlas();
            atlas.agent("extractor").unwrap().chat("x").await.unwrap();
            assert!(fake.recorded()[0].chat().unwrap().response_format.is_none());
        }
    }

    mod pipelines {
        use super::*;

        #[tokio::test]
        async fn before_execute_rewrites_input() {
            let (atlas, fake) = atlas();
            atlas.pipelines().register(
                events::AGENT_BEFORE_EXECUTE,
                handler_fn(|mut execution: AgentExecution| {
                    execution.input = execution.input.to_uppercase();
                    Ok(execution)
                }),
                0,
            );
            atlas.agent("support").unwrap().chat("quiet").await.unwrap();
            assert_eq!(fake.recorded()[0].prompt(), Some("QUIET"));
        }

        #[tokio::test]
        async fn after_execute_sees_the_response() {
            let (atlas, fake) = atlas();
            let _fake = fake.respond_with(FakeResponse::text("raw"));
            let response = atlas
                .agent("support")
                .unwrap()
                .with_middleware(
                    events::AGENT_AFTER_EXECUTE,
                    handler_fn(|mut execution: AgentExecution| {
                        if let Some(response) = execution.response.as_mut() {
                            response.text = Some(format!("[{}]", response.text()));
                        }
                        Ok(execution)
                    }),
                    0,
                )
                .chat("hi")
                .await
                .unwrap();
            assert_eq!(response.text(), "[raw]");
        }

        #[tokio::test]
        async fn on_error_sees_and_replaces_failures() {
            let (atlas, fake) = atlas();
            let _fake = fake.respond_with(FakeResponse::error(ProviderError::network("down")));
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);

            let err = atlas
                .agent("support")
                .unwrap()
                .with_middleware(
                    events::AGENT_ON_ERROR,
                    handler_fn(move |mut failure: AgentFailure| {
                        sink.lock().unwrap().push(failure.agent.clone());
                        failure.error = Error::agent("support is unavailable");
                        Ok(failure)
                    }),
                    0,
                )
                .chat("hi")
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), Error::agent("support is unavailable").to_string());
            assert_eq!(*seen.lock().unwrap(), vec!["support".to_owned()]);
        }
    }

    mod streaming {
        use super::*;

        #[tokio::test]
        async fn chunks_pass_through_on_chunk() {
            let (atlas, fake) = atlas();
            let _fake = fake.respond_with(FakeResponse::text("one two"));
            let finished = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&finished);

            let stream = atlas
                .agent("support")
                .unwrap()
                .with_middleware(
                    events::AGENT_STREAM_ON_CHUNK,
                    handler_fn(|mut payload: StreamChunkPayload| {
                        if let StreamChunk::Text { text } = &mut payload.chunk {
                            *text = text.to_uppercase();
                        }
                        Ok(payload)
                    }),
                    0,
                )
                .with_middleware(
                    events::AGENT_AFTER_EXECUTE,
                    handler_fn(move |execution: AgentExecution| {
                        *sink.lock().unwrap() = execution.response.clone();
                        Ok(execution)
                    }),
                    0,
                )
                .stream("hi")
                .await
                .unwrap();

            let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;
            let text: String = chunks.iter().filter_map(StreamChunk::as_text).collect();
            assert_eq!(text, "ONE TWO");

            let response = finished.lock().unwrap().clone().unwrap();
            assert_eq!(response.text(), "ONE TWO");
            assert_eq!(response.steps, 1);
        }

        #[tokio::test]
        async fn opening_the_stream_honours_client_retry() {
            let (atlas, fake) = atlas();
            let fake = fake.sequence(
                FakeResponseSequence::new()
                    .then(FakeResponse::error(ProviderError::rate_limited("fake")))
                    .then(FakeResponse::text("recovered")),
            );

            let stream = atlas
                .agent("support")
                .unwrap()
                .with_call(RequestCall::WithClientRetry(RetryConfig::new(3, 0)))
                .stream("hi")
                .await
                .unwrap();

            let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;
            let text: String = chunks.iter().filter_map(StreamChunk::as_text).collect();
            assert_eq!(text, "recovered");
            fake.assert_called_times(2);
        }

        #[tokio::test]
        async fn opening_the_stream_without_retry_fails_fast() {
            let (atlas, fake) = atlas();
            let fake = fake.sequence(
                FakeResponseSequence::new()
                    .then(FakeResponse::error(ProviderError::rate_limited("fake")))
                    .then(FakeResponse::text("unused")),
            );

            assert!(atlas.agent("support").unwrap().stream("hi").await.is_err());
            fake.assert_called_times(1);
        }
    }
}
