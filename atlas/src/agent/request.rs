use serde_json::{Map, Value};

use crate::atlas::Atlas;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::message::Message;
use crate::pipeline::PipelineHandler;
use crate::proxy::RequestCall;
use crate::schema::SchemaSpec;
use crate::stream::ChatStream;

use super::definition::SharedAgent;
use super::executor::{AgentExecutor, ExecutionOptions};
use super::response::{AgentResponse, ExecutionMode};

/// A single call to an agent, configured fluently.
///
/// Nothing is shared between calls: every `with_*` method adjusts this
/// request only.
///
/// ```rust,ignore
/// let reply = atlas
///     .agent("support")?
///     .with_variable("user_name", "Ada")
///     .with_metadata_value("user_id", 42)
///     .chat("Where is my order?")
///     .await?;
/// ```
#[derive(Clone)]
pub struct PendingAgentRequest {
    executor: AgentExecutor,
    agent: SharedAgent,
    context: ExecutionContext,
    options: ExecutionOptions,
}

impl PendingAgentRequest {
    pub(crate) fn new(atlas: Atlas, agent: SharedAgent) -> Self {
        Self {
            executor: AgentExecutor::new(atlas),
            agent,
            context: ExecutionContext::new(),
            options: ExecutionOptions::default(),
        }
    }

    /// Key of the target agent.
    #[must_use]
    pub fn agent_key(&self) -> String {
        self.agent.key()
    }

    /// The context built so far.
    #[must_use]
    pub const fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Replace the whole context.
    #[must_use]
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the conversation history.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.context = self.context.with_messages(messages);
        self
    }

    /// Merge prompt variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.context = self.context.merge_variables(variables);
        self
    }

    /// Set one prompt variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context = self.context.with_variable(key, value);
        self
    }

    /// Merge metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.context = self.context.merge_metadata(metadata);
        self
    }

    /// Set one metadata value.
    #[must_use]
    pub fn with_metadata_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context = self.context.with_metadata_value(key, value);
        self
    }

    /// Record a provider request call, replayed after the agent settings.
    #[must_use]
    pub fn with_call(mut self, call: RequestCall) -> Self {
        self.context = self.context.with_request_call(call);
        self
    }

    /// Use `schema` for structured calls instead of the agent's.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<SchemaSpec>) -> Self {
        self.options.schema = Some(schema.into());
        self
    }

    /// Use another provider for this call.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.options.provider = Some(provider.into());
        self
    }

    /// Use another model for this call.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Append a `## {title}` section to the system prompt.
    #[must_use]
    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.options.prompt = self.options.prompt.add_section(title, content);
        self
    }

    /// Attach a handler to `event` for this call only.
    #[must_use]
    pub fn with_middleware<T, H>(mut self, event: impl Into<String>, handler: H, priority: i32) -> Self
    where
        T: Send + 'static,
        H: PipelineHandler<T> + 'static,
    {
        self.options.runtime.register(event, handler, priority);
        self
    }

    /// Send `input` and run tools until the agent answers.
    ///
    /// # Errors
    ///
    /// See [`AgentExecutor::execute`].
    pub async fn chat(self, input: impl AsRef<str>) -> Result<AgentResponse> {
        self.executor
            .execute(
                self.agent.as_ref(),
                input.as_ref(),
                self.context,
                ExecutionMode::Chat,
                &self.options,
            )
            .await
    }

    /// Send `input` and decode the answer against the output schema.
    ///
    /// # Errors
    ///
    /// See [`AgentExecutor::execute`].
    pub async fn structured(self, input: impl AsRef<str>) -> Result<AgentResponse> {
        self.executor
            .execute(
                self.agent.as_ref(),
                input.as_ref(),
                self.context,
                ExecutionMode::Structured,
                &self.options,
            )
            .await
    }

    /// Stream one answer to `input`.
    ///
    /// # Errors
    ///
    /// See [`AgentExecutor::stream`].
    pub async fn stream(self, input: impl AsRef<str>) -> Result<ChatStream> {
        self.executor
            .stream(self.agent.as_ref(), input.as_ref(), self.context, &self.options)
            .await
    }
}

impl std::fmt::Debug for PendingAgentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAgentRequest")
            .field("agent", &self.agent.key())
            .field("context", &self.context)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
