//! Request proxies: capture fluent calls, replay them, and wrap execution in
//! pipelines.
//!
//! A [`RequestProxy`] records every configuration call as a [`RequestCall`].
//! Nothing touches a provider until a terminal method runs. The terminal
//! then replays the calls into a [`PendingRequest`] and runs:
//!
//! 1. `{module}.before_{method}`, whose handlers may rewrite the request,
//! 2. the provider call, with retry and tool round-trips,
//! 3. `{module}.after_{method}`, whose handlers may rewrite the output,
//! 4. `{module}.on_error` if any of the above failed.
//!
//! ```rust,ignore
//! let reply = atlas
//!     .text()
//!     .using("openai", "gpt-4o-mini")
//!     .with_system_prompt("Answer in one word.")
//!     .with_prompt("Capital of France?")
//!     .as_text()
//!     .await?;
//! ```

mod call;
mod payload;

use futures::StreamExt;
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span, warn};

use crate::agent::StepRunner;
use crate::atlas::Atlas;
use crate::error::{Error, ProviderError, Result};
use crate::message::Message;
use crate::pipeline::{PipelineHandler, RuntimeHandlers};
use crate::provider::{EmbeddingResponse, StructuredResponse};
use crate::retry::{RetryConfig, retry_async};
use crate::schema::SchemaSpec;
use crate::stream::{ChatStream, StreamAggregator};
use crate::tool::{ToolContext, ToolDefinition};

pub use call::{PendingRequest, RequestCall};
pub use payload::{
    ProxyFailure, ProxyMethod, ProxyModule, ProxyOutput, ProxyRequest, ProxyResponse,
    TextResponse,
};

use payload::{after_event, before_event, error_event};

/// A module-scoped request under construction.
#[derive(Debug, Clone)]
pub struct RequestProxy {
    atlas: Atlas,
    module: ProxyModule,
    calls: Vec<RequestCall>,
    runtime: RuntimeHandlers,
    metadata: Map<String, Value>,
}

impl RequestProxy {
    pub(crate) fn new(atlas: Atlas, module: ProxyModule) -> Self {
        Self {
            atlas,
            module,
            calls: Vec::new(),
            runtime: RuntimeHandlers::new(),
            metadata: Map::new(),
        }
    }

    /// The module this proxy fires pipelines for.
    #[must_use]
    pub const fn module(&self) -> ProxyModule {
        self.module
    }

    /// Calls captured so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[RequestCall] {
        &self.calls
    }

    /// Record an arbitrary call.
    #[must_use]
    pub fn with_call(mut self, call: RequestCall) -> Self {
        debug!(module = %self.module, call = call.name(), "captured request call");
        self.calls.push(call);
        self
    }

    /// Use `provider` with `model`.
    #[must_use]
    pub fn using(self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.with_call(RequestCall::Using {
            provider: provider.into(),
            model: Some(model.into()),
        })
    }

    /// Use `provider` with its default model.
    #[must_use]
    pub fn using_provider(self, provider: impl Into<String>) -> Self {
        self.with_call(RequestCall::Using {
            provider: provider.into(),
            model: None,
        })
    }

    /// Use `model` on the resolved provider.
    #[must_use]
    pub fn with_model(self, model: impl Into<String>) -> Self {
        self.with_call(RequestCall::WithModel(model.into()))
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        self.with_call(RequestCall::WithSystemPrompt(prompt.into()))
    }

    /// Append a user message.
    #[must_use]
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.with_call(RequestCall::WithPrompt(prompt.into()))
    }

    /// Append prior conversation.
    #[must_use]
    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        self.with_call(RequestCall::WithMessages(messages))
    }

    /// Limit the response length.
    #[must_use]
    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        self.with_call(RequestCall::WithMaxTokens(max_tokens))
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn using_temperature(self, temperature: f32) -> Self {
        self.with_call(RequestCall::UsingTemperature(temperature))
    }

    /// Set nucleus sampling.
    #[must_use]
    pub fn using_top_p(self, top_p: f32) -> Self {
        self.with_call(RequestCall::UsingTopP(top_p))
    }

    /// Expose registered tools by name.
    #[must_use]
    pub fn with_tools<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_call(RequestCall::WithTools(names.into_iter().map(Into::into).collect()))
    }

    /// Request output matching `schema`.
    #[must_use]
    pub fn with_schema(self, schema: impl Into<SchemaSpec>) -> Self {
        self.with_call(RequestCall::WithSchema(schema.into()))
    }

    /// Merge provider-specific options.
    #[must_use]
    pub fn with_provider_options(self, options: Map<String, Value>) -> Self {
        self.with_call(RequestCall::WithProviderOptions(options))
    }

    /// Retry the provider call.
    #[must_use]
    pub fn with_client_retry(self, retry: RetryConfig) -> Self {
        self.with_call(RequestCall::WithClientRetry(retry))
    }

    /// Allow up to `steps` provider turns when tools are involved.
    #[must_use]
    pub fn with_max_steps(self, steps: u32) -> Self {
        self.with_call(RequestCall::WithMaxSteps(steps))
    }

    /// Append embedding inputs.
    #[must_use]
    pub fn with_input<I, S>(self, input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_call(RequestCall::WithInput(input.into_iter().map(Into::into).collect()))
    }

    /// Request embedding dimensions.
    #[must_use]
    pub fn with_dimensions(self, dimensions: u32) -> Self {
        self.with_call(RequestCall::WithDimensions(dimensions))
    }

    /// Set a metadata value visible to pipelines and tools.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a handler to `event` for this request only.
    #[must_use]
    pub fn with_middleware<T, H>(mut self, event: impl Into<String>, handler: H, priority: i32) -> Self
    where
        T: Send + 'static,
        H: PipelineHandler<T> + 'static,
    {
        self.runtime.register(event, handler, priority);
        self
    }

    /// Replay the captured calls without executing anything.
    #[must_use]
    pub fn pending(&self) -> PendingRequest {
        PendingRequest::replay(&self.calls)
    }

    /// Generate text, running any requested tools.
    ///
    /// # Errors
    ///
    /// Provider, tool resolution and pipeline handler errors, after
    /// `{module}.on_error` had a chance to rewrite them.
    pub async fn as_text(self) -> Result<TextResponse> {
        match self.dispatch(ProxyMethod::Text).await? {
            ProxyOutput::Text(response) => Ok(response),
            other => Err(self.mismatch(ProxyMethod::Text, &other)),
        }
    }

    /// Generate output matching the captured schema.
    ///
    /// # Errors
    ///
    /// Fails without a schema, on provider errors, or when the reply is not
    /// JSON.
    pub async fn as_structured(self) -> Result<StructuredResponse> {
        match self.dispatch(ProxyMethod::Structured).await? {
            ProxyOutput::Structured(response) => Ok(response),
            other => Err(self.mismatch(ProxyMethod::Structured, &other)),
        }
    }

    /// Embed the captured inputs.
    ///
    /// # Errors
    ///
    /// Fails without inputs or on provider errors.
    pub async fn as_embeddings(self) -> Result<EmbeddingResponse> {
        match self.dispatch(ProxyMethod::Embeddings).await? {
            ProxyOutput::Embeddings(response) => Ok(response),
            other => Err(self.mismatch(ProxyMethod::Embeddings, &other)),
        }
    }

    /// Stream a single provider turn.
    ///
    /// `{module}.after_stream` runs once the returned stream is drained, with
    /// the aggregated response. Errors raised while streaming go through
    /// `{module}.on_error` and are yielded as the final item.
    ///
    /// # Errors
    ///
    /// Fails if the before handlers fail or the stream cannot be opened.
    pub async fn as_stream(self) -> Result<ChatStream> {
        let method = ProxyMethod::Stream;
        let span = info_span!("atlas.request", module = %self.module, method = %method);
        let pending = self.pending();

        let opened = async {
            let before = self.before(method, pending.clone()).await?;
            let (provider, model) = self
                .atlas
                .resolve_chat(before.request.provider.as_deref(), before.request.model.as_deref())?;
            let tools = self.atlas.tools().only(&before.request.tools)?;
            let definitions: Vec<ToolDefinition> = tools.iter().map(|t| t.definition()).collect();
            let mut request = before.request.to_chat_request(&model, definitions);
            request.stream = true;
            let retry = before.request.retry.as_ref().or(self.atlas.config().retry.as_ref());
            let inner = match retry {
                Some(config) => retry_async(config, || provider.chat_stream(&request)).await?,
                None => provider.chat_stream(&request).await?,
            };
            Ok::<_, Error>((before.request, inner))
        }
        .instrument(span)
        .await;

        let (request, mut inner) = match opened {
            Ok(opened) => opened,
            Err(error) => return Err(self.fail(method, pending, error).await),
        };

        Ok(Box::pin(async_stream::stream! {
            let mut aggregator = StreamAggregator::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        aggregator.apply(&chunk);
                        yield Ok(chunk);
                    }
                    Err(error) => {
                        yield Err(self.fail(method, request.clone(), error).await);
                        return;
                    }
                }
            }

            debug!(chunks = aggregator.chunk_count(), "stream drained");
            let after = ProxyResponse {
                module: self.module,
                method,
                request: request.clone(),
                output: ProxyOutput::Stream(aggregator.into_chat_response()),
            };
            let event = after_event(self.module, method);
            if let Err(error) = self.atlas.runner().run_with(&event, after, &self.runtime).await {
                yield Err(self.fail(method, request, error).await);
            }
        }))
    }

    async fn dispatch(&self, method: ProxyMethod) -> Result<ProxyOutput> {
        let span = info_span!("atlas.request", module = %self.module, method = %method);
        async {
            let pending = self.pending();
            match self.stages(method, pending.clone()).await {
                Ok(output) => Ok(output),
                Err(error) => Err(self.fail(method, pending, error).await),
            }
        }
        .instrument(span)
        .await
    }

    async fn stages(&self, method: ProxyMethod, pending: PendingRequest) -> Result<ProxyOutput> {
        let before = self.before(method, pending).await?;
        let output = self.execute(method, &before).await?;
        let after = ProxyResponse {
            module: self.module,
            method,
            request: before.request,
            output,
        };
        let after = self
            .atlas
            .runner()
            .run_with(&after_event(self.module, method), after, &self.runtime)
            .await?;
        Ok(after.output)
    }

    async fn before(&self, method: ProxyMethod, request: PendingRequest) -> Result<ProxyRequest> {
        let payload = ProxyRequest {
            module: self.module,
            method,
            request,
            metadata: self.metadata.clone(),
        };
        self.atlas
            .runner()
            .run_with(&before_event(self.module, method), payload, &self.runtime)
            .await
    }

    async fn execute(&self, method: ProxyMethod, before: &ProxyRequest) -> Result<ProxyOutput> {
        let request = &before.request;
        let retry = request.retry.as_ref().or(self.atlas.config().retry.as_ref());

        if method == ProxyMethod::Embeddings {
            if request.input.is_empty() {
                return Err(ProviderError::invalid_request("embeddings need at least one input").into());
            }
            let (provider, model) = self
                .atlas
                .resolve_embeddings(request.provider.as_deref(), request.model.as_deref())?;
            let embedding_request = request.to_embedding_request(&model);
            let response = match retry {
                Some(config) => retry_async(config, || provider.embed(&embedding_request)).await?,
                None => provider.embed(&embedding_request).await?,
            };
            return Ok(ProxyOutput::Embeddings(response));
        }

        if method == ProxyMethod::Structured && request.schema.is_none() {
            return Err(ProviderError::invalid_request("structured requests need a schema").into());
        }

        let (provider, model) = self
            .atlas
            .resolve_chat(request.provider.as_deref(), request.model.as_deref())?;
        let tools = self.atlas.tools().only(&request.tools)?;
        let definitions: Vec<ToolDefinition> = tools.iter().map(|t| t.definition()).collect();
        let context = ToolContext::new(before.metadata.clone());

        let outcome = StepRunner {
            provider: provider.as_ref(),
            executor: self.atlas.tool_executor(),
            tools: &tools,
            context: &context,
            runtime: &self.runtime,
            max_steps: request
                .max_steps
                .unwrap_or(self.atlas.config().agents.max_steps),
            retry,
        }
        .run(request.to_chat_request(&model, definitions))
        .await?;

        if method == ProxyMethod::Structured {
            return Ok(ProxyOutput::Structured(StructuredResponse::from_response(
                outcome.response,
            )?));
        }

        Ok(ProxyOutput::Text(TextResponse {
            text: outcome.response.text().unwrap_or_default(),
            response: outcome.response,
            tool_calls: outcome.tool_calls,
            steps: outcome.steps,
            usage: outcome.usage,
            messages: outcome.messages,
        }))
    }

    async fn fail(&self, method: ProxyMethod, request: PendingRequest, error: Error) -> Error {
        warn!(module = %self.module, method = %method, error = %error, "proxied request failed");
        let failure = ProxyFailure {
            module: self.module,
            method,
            request,
            error,
        };
        match self
            .atlas
            .runner()
            .run_with(&error_event(self.module), failure, &self.runtime)
            .await
        {
            Ok(failure) => failure.error,
            Err(handler_error) => handler_error,
        }
    }

    fn mismatch(&self, method: ProxyMethod, output: &ProxyOutput) -> Error {
        Error::pipeline(
            after_event(self.module, method),
            format!("handler replaced the {method} output with {} output", output.kind()),
        )
    }
}
