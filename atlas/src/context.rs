//! Stateless per-call execution context.
//!
//! An [`ExecutionContext`] carries everything one agent call needs that is
//! not part of the agent definition: prior conversation, prompt variables,
//! metadata for tools and pipelines, and captured request calls. Every
//! mutator consumes the context and returns a new one, so a context can be
//! shared and reused without surprises.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;
use crate::proxy::RequestCall;
use crate::tool::ToolContext;

/// Conversation, variables and metadata for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    messages: Vec<Message>,
    variables: Map<String, Value>,
    metadata: Map<String, Value>,
    request_calls: Vec<RequestCall>,
}

impl ExecutionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the conversation history.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Append one message to the history.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the prompt variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Merge variables, overwriting existing keys.
    #[must_use]
    pub fn merge_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Set one variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Merge metadata, overwriting existing keys.
    #[must_use]
    pub fn merge_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Set one metadata value.
    #[must_use]
    pub fn with_metadata_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the captured request calls.
    #[must_use]
    pub fn with_request_calls(mut self, calls: Vec<RequestCall>) -> Self {
        self.request_calls = calls;
        self
    }

    /// Append one captured request call.
    #[must_use]
    pub fn with_request_call(mut self, call: RequestCall) -> Self {
        self.request_calls.push(call);
        self
    }

    /// Conversation history.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Prompt variables.
    #[must_use]
    pub const fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// One prompt variable.
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Captured request calls, in capture order.
    #[must_use]
    pub fn request_calls(&self) -> &[RequestCall] {
        &self.request_calls
    }

    /// Whether any prior conversation is present.
    #[must_use]
    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Context handed to tools invoked by `agent`.
    #[must_use]
    pub fn tool_context(&self, agent: &str) -> ToolContext {
        ToolContext::new(self.metadata.clone()).for_agent(agent)
    }
}
