//! Captured request calls and their replay into a [`PendingRequest`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;
use crate::provider::{ChatRequest, EmbeddingRequest, ResponseFormat};
use crate::retry::RetryConfig;
use crate::schema::SchemaSpec;
use crate::tool::ToolDefinition;

/// One fluent configuration call, recorded for later replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call", content = "args", rename_all = "snake_case")]
pub enum RequestCall {
    /// Select a provider and optionally a model. Without one the provider's
    /// default model is used, even if an earlier call picked another.
    Using {
        /// Provider name.
        provider: String,
        /// Model identifier.
        model: Option<String>,
    },
    /// Select a model on the current provider.
    WithModel(String),
    /// Set the system prompt.
    WithSystemPrompt(String),
    /// Append a user message.
    WithPrompt(String),
    /// Append prior messages.
    WithMessages(Vec<Message>),
    /// Limit the response length.
    WithMaxTokens(u32),
    /// Set the sampling temperature.
    UsingTemperature(f32),
    /// Set nucleus sampling.
    UsingTopP(f32),
    /// Expose registered tools by name.
    WithTools(Vec<String>),
    /// Request structured output matching a schema.
    WithSchema(SchemaSpec),
    /// Merge provider-specific options.
    WithProviderOptions(Map<String, Value>),
    /// Retry the provider call on failure.
    WithClientRetry(RetryConfig),
    /// Allow up to this many tool round-trips.
    WithMaxSteps(u32),
    /// Append embedding inputs.
    WithInput(Vec<String>),
    /// Request embedding dimensions.
    WithDimensions(u32),
}

impl RequestCall {
    /// Method-style name of the call, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Using { .. } => "using",
            Self::WithModel(_) => "with_model",
            Self::WithSystemPrompt(_) => "with_system_prompt",
            Self::WithPrompt(_) => "with_prompt",
            Self::WithMessages(_) => "with_messages",
            Self::WithMaxTokens(_) => "with_max_tokens",
            Self::UsingTemperature(_) => "using_temperature",
            Self::UsingTopP(_) => "using_top_p",
            Self::WithTools(_) => "with_tools",
            Self::WithSchema(_) => "with_schema",
            Self::WithProviderOptions(_) => "with_provider_options",
            Self::WithClientRetry(_) => "with_client_retry",
            Self::WithMaxSteps(_) => "with_max_steps",
            Self::WithInput(_) => "with_input",
            Self::WithDimensions(_) => "with_dimensions",
        }
    }
}

/// A request materialized from captured calls.
///
/// Scalar settings take the value of the last call that set them. Messages,
/// inputs, tools and provider options accumulate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Provider name, if one was selected.
    pub provider: Option<String>,
    /// Model, if one was selected.
    pub model: Option<String>,
    /// System prompt.
    pub system_prompt: Option<String>,
    /// Conversation messages, in call order.
    pub messages: Vec<Message>,
    /// Response length limit.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling.
    pub top_p: Option<f32>,
    /// Tool names.
    pub tools: Vec<String>,
    /// Structured output schema.
    pub schema: Option<SchemaSpec>,
    /// Provider-specific options.
    pub provider_options: Map<String, Value>,
    /// Client retry.
    pub retry: Option<RetryConfig>,
    /// Tool round-trip limit.
    pub max_steps: Option<u32>,
    /// Embedding inputs.
    pub input: Vec<String>,
    /// Embedding dimensions.
    pub dimensions: Option<u32>,
}

impl PendingRequest {
    /// Replay `calls` in order onto an empty request.
    #[must_use]
    pub fn replay(calls: &[RequestCall]) -> Self {
        let mut request = Self::default();
        request.apply_all(calls);
        request
    }

    /// Apply `calls` in order.
    pub fn apply_all(&mut self, calls: &[RequestCall]) {
        for call in calls {
            self.apply(call.clone());
        }
    }

    /// Apply a single call.
    pub fn apply(&mut self, call: RequestCall) {
        match call {
            RequestCall::Using { provider, model } => {
                self.provider = Some(provider);
                self.model = model;
            }
            RequestCall::WithModel(model) => self.model = Some(model),
            RequestCall::WithSystemPrompt(prompt) => self.system_prompt = Some(prompt),
            RequestCall::WithPrompt(prompt) => self.messages.push(Message::user(prompt)),
            RequestCall::WithMessages(messages) => self.messages.extend(messages),
            RequestCall::WithMaxTokens(n) => self.max_tokens = Some(n),
            RequestCall::UsingTemperature(t) => self.temperature = Some(t),
            RequestCall::UsingTopP(p) => self.top_p = Some(p),
            RequestCall::WithTools(tools) => {
                for tool in tools {
                    if !self.tools.contains(&tool) {
                        self.tools.push(tool);
                    }
                }
            }
            RequestCall::WithSchema(schema) => self.schema = Some(schema),
            RequestCall::WithProviderOptions(options) => self.provider_options.extend(options),
            RequestCall::WithClientRetry(retry) => self.retry = Some(retry),
            RequestCall::WithMaxSteps(n) => self.max_steps = Some(n),
            RequestCall::WithInput(input) => self.input.extend(input),
            RequestCall::WithDimensions(n) => self.dimensions = Some(n),
        }
    }

    /// Build a chat request for `model`, attaching `tools` definitions.
    ///
    /// The system prompt, when set, is sent as the leading message.
    #[must_use]
    pub fn to_chat_request(&self, model: &str, tools: Vec<ToolDefinition>) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.messages.iter().cloned());

        let mut request = ChatRequest::new(model).messages(messages);
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.top_p = self.top_p;
        if !tools.is_empty() {
            request = request.tools(tools);
        }
        if let Some(schema) = &self.schema {
            request = request.response_format(ResponseFormat::json_schema(
                schema.name.clone(),
                schema.schema.clone(),
            ));
        }
        request.provider_options(self.provider_options.clone())
    }

    /// Build an embeddings request for `model`.
    #[must_use]
    pub fn to_embedding_request(&self, model: &str) -> EmbeddingRequest {
        let mut request = EmbeddingRequest::new(model);
        request.input.clone_from(&self.input);
        request.dimensions = self.dimensions;
        request.provider_options.clone_from(&self.provider_options);
        request
    }
}
