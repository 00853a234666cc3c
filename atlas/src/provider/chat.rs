//! Chat request/response types and the [`ChatProvider`] trait.
//!
//! This is the seam between Atlas and the provider layer it wraps:
//! - [`ChatRequest`]: request parameters for chat completions
//! - [`ChatResponse`]: response from chat completions
//! - [`ChatProvider`]: the trait concrete provider clients implement
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas::prelude::*;
//!
//! let request = ChatRequest::new("gpt-4o")
//!     .system("You are helpful.")
//!     .user("Hello!")
//!     .max_tokens(100)
//!     .temperature(0.7);
//!
//! let response = provider.chat(&request).await?;
//! println!("{}", response.text().unwrap_or_default());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProviderError, Result};
use crate::message::{Message, ToolCall};
use crate::stream::{ChatStream, StopReason};
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// A chat completion request.
///
/// Some fields are provider-specific and may be ignored by other backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier (e.g., "gpt-4o", "claude-3-5-sonnet").
    #[serde(default)]
    pub model: String,

    /// Conversation messages.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Tools available for the model to call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Controls how the model uses tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,

    /// Response format specification (for JSON mode / structured outputs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// Provider-specific options passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_options: Map<String, Value>,

    /// Caller metadata. Atlas records the calling agent here under
    /// [`ChatRequest::AGENT_KEY`].
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ChatRequest {
    /// Metadata key holding the key of the agent that issued the request.
    pub const AGENT_KEY: &'static str = "atlas.agent";

    /// Creates a new request with the specified model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Adds a system message.
    #[must_use]
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    /// Adds a user message.
    #[must_use]
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Adds a message.
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Sets all messages.
    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Sets max tokens.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets `top_p`.
    #[must_use]
    pub const fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets tools.
    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets tool choice.
    #[must_use]
    pub fn tool_choice(mut self, choice: impl Into<ToolChoice>) -> Self {
        self.tool_choice = Some(choice.into().to_value());
        self
    }

    /// Sets response format.
    #[must_use]
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Merges provider-specific options, later keys win.
    #[must_use]
    pub fn provider_options(mut self, options: Map<String, Value>) -> Self {
        self.provider_options.extend(options);
        self
    }

    /// Sets one metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Key of the agent that issued the request, if recorded.
    #[must_use]
    pub fn agent(&self) -> Option<&str> {
        self.metadata.get(Self::AGENT_KEY).and_then(Value::as_str)
    }

    /// Returns the system prompt, if the first message is a system message.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == crate::message::Role::System)
            .and_then(|m| m.content.as_deref())
    }
}

/// Controls how the model uses tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to use tools.
    #[default]
    Auto,
    /// Model must use at least one tool.
    Required,
    /// Model cannot use any tools.
    None,
    /// Model must use the specified function.
    Function(String),
}

impl ToolChoice {
    /// Converts to JSON value for serialization.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Auto => Value::String("auto".to_owned()),
            Self::Required => Value::String("required".to_owned()),
            Self::None => Value::String("none".to_owned()),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": {"name": name}
            }),
        }
    }
}

impl From<&str> for ToolChoice {
    fn from(s: &str) -> Self {
        match s {
            "auto" => Self::Auto,
            "required" => Self::Required,
            "none" => Self::None,
            name => Self::Function(name.to_owned()),
        }
    }
}

/// Response format specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text response.
    Text,
    /// JSON object response.
    JsonObject,
    /// JSON response with schema (structured outputs).
    JsonSchema {
        /// Schema definition.
        json_schema: JsonSchemaSpec,
    },
}

impl ResponseFormat {
    /// Creates a JSON schema format.
    #[must_use]
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self::JsonSchema {
            json_schema: JsonSchemaSpec {
                name: name.into(),
                schema,
                strict: Some(true),
            },
        }
    }
}

/// JSON schema specification for structured outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
    /// Schema name.
    pub name: String,
    /// JSON Schema definition.
    pub schema: Value,
    /// Whether to enforce strict validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// A chat completion response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message.
    pub message: Message,

    /// Why the model stopped generating.
    #[serde(default)]
    pub stop_reason: StopReason,

    /// Token usage statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Model identifier used for this response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Unique completion ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChatResponse {
    /// Creates a new response with a message.
    #[must_use]
    pub const fn new(message: Message) -> Self {
        Self {
            message,
            stop_reason: StopReason::Stop,
            usage: None,
            model: None,
            id: None,
        }
    }

    /// Creates a response from text content.
    #[must_use]
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::new(Message::assistant(content))
    }

    /// Creates a response that requests tool calls.
    #[must_use]
    pub fn from_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self::new(Message::assistant_tool_calls(tool_calls)).with_stop_reason(StopReason::ToolCalls)
    }

    /// Sets the stop reason.
    #[must_use]
    pub const fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    /// Sets usage statistics.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Returns the text content of the response.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.message.text()
    }

    /// Deserialize the response text into a concrete Rust type.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the text cannot be deserialized into `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        let text = self.text().unwrap_or_default();
        serde_json::from_str(&text)
    }

    /// Returns `true` if the response contains tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.message.has_tool_calls()
    }

    /// Returns the tool calls if present.
    #[must_use]
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.message.tool_calls.as_deref()
    }
}

/// A structured-output response: the decoded JSON value plus the raw response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// The decoded structured value.
    pub structured: Value,
    /// The underlying chat response.
    pub response: ChatResponse,
}

impl StructuredResponse {
    /// Decodes a chat response whose text is a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a response-format error if the text is not valid JSON.
    pub fn from_response(response: ChatResponse) -> Result<Self> {
        let text = response.text().unwrap_or_default();
        let structured = serde_json::from_str(&text)
            .map_err(|e| ProviderError::response_format("JSON", e.to_string()))?;
        Ok(Self {
            structured,
            response,
        })
    }

    /// Deserialize the structured value into a concrete Rust type.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the value does not match `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.structured)
    }
}

/// Trait for providers that support chat completions.
///
/// Every backend the provider layer offers implements this trait. Atlas only
/// ever talks to providers through it.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a chat completion request and receive a complete response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and receive a streaming response.
    ///
    /// By default this returns a not-supported error.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let _ = request;
        Err(ProviderError::not_supported("streaming")
            .for_provider(self.provider_name())
            .into())
    }

    /// Get the name of this provider.
    fn provider_name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Check if this provider supports streaming.
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// Type alias for an Arc-wrapped [`ChatProvider`].
pub type SharedChatProvider = std::sync::Arc<dyn ChatProvider>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod chat_request {
        use super::*;

        #[test]
        fn builder_collects_messages() {
            let req = ChatRequest::new("gpt-4o")
                .system("You are helpful")
                .user("Hi");
            assert_eq!(req.model, "gpt-4o");
            assert_eq!(req.messages.len(), 2);
            assert_eq!(req.system_prompt(), Some("You are helpful"));
        }

        #[test]
        fn system_prompt_absent_without_system_message() {
            let req = ChatRequest::new("m").user("Hi");
            assert!(req.system_prompt().is_none());
        }

        #[test]
        fn provider_options_merge() {
            let mut first = Map::new();
            first.insert("a".into(), json!(1));
            let mut second = Map::new();
            second.insert("a".into(), json!(2));
            second.insert("b".into(), json!(3));

            let req = ChatRequest::new("m")
                .provider_options(first)
                .provider_options(second);
            assert_eq!(req.provider_options["a"], 2);
            assert_eq!(req.provider_options["b"], 3);
        }

        #[test]
        fn agent_metadata() {
            let req = ChatRequest::new("m").with_metadata(ChatRequest::AGENT_KEY, "support");
            assert_eq!(req.agent(), Some("support"));
            assert!(ChatRequest::new("m").agent().is_none());
        }

        #[test]
        fn tool_choice_serializes() {
            let req = ChatRequest::new("m").tool_choice("lookup");
            assert_eq!(
                req.tool_choice.unwrap()["function"]["name"],
                json!("lookup")
            );
            assert_eq!(ToolChoice::from("auto"), ToolChoice::Auto);
        }
    }

    mod responses {
        use super::*;

        #[test]
        fn parse_decodes_text() {
            let response = ChatResponse::from_text(r#"{"n": 1}"#);
            let value: Value = response.parse().unwrap();
            assert_eq!(value["n"], 1);
        }

        #[test]
        fn structured_from_response() {
            let structured =
                StructuredResponse::from_response(ChatResponse::from_text(r#"{"ok": true}"#))
                    .unwrap();
            assert_eq!(structured.structured["ok"], true);

            #[derive(serde::Deserialize)]
            struct Flag {
                ok: bool,
            }
            assert!(structured.parse::<Flag>().unwrap().ok);
        }

        #[test]
        fn structured_rejects_non_json() {
            let err = StructuredResponse::from_response(ChatResponse::from_text("nope"));
            assert!(err.is_err());
        }

        #[test]
        fn tool_call_response_flags() {
            let response =
                ChatResponse::from_tool_calls(vec![ToolCall::new("1", "echo", json!({}))]);
            assert!(response.has_tool_calls());
            assert!(response.stop_reason.is_tool_call());
        }
    }
}
