//! Payloads carried through the proxy pipelines.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::message::Message;
use crate::pipeline::events::{self, ProxyStage};
use crate::provider::{ChatResponse, EmbeddingResponse, StructuredResponse};
use crate::tool::ToolCallRecord;
use crate::usage::Usage;

use super::call::PendingRequest;

/// Which proxy a request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyModule {
    /// Plain text generation.
    Text,
    /// Structured output.
    Structured,
    /// Embeddings.
    Embeddings,
}

impl ProxyModule {
    /// Every proxy module.
    pub const ALL: [Self; 3] = [Self::Text, Self::Structured, Self::Embeddings];

    /// Terminal methods reachable from this module.
    #[must_use]
    pub const fn methods(self) -> &'static [ProxyMethod] {
        match self {
            Self::Text => &[ProxyMethod::Text, ProxyMethod::Stream],
            Self::Structured => &[ProxyMethod::Structured],
            Self::Embeddings => &[ProxyMethod::Embeddings],
        }
    }

    /// Module name as used in pipeline names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Structured => "structured",
            Self::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for ProxyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal method that executed a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMethod {
    /// `as_text`.
    Text,
    /// `as_structured`.
    Structured,
    /// `as_stream`.
    Stream,
    /// `as_embeddings`.
    Embeddings,
}

impl ProxyMethod {
    /// Method name as used in pipeline names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Structured => "structured",
            Self::Stream => "stream",
            Self::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn before_event(module: ProxyModule, method: ProxyMethod) -> String {
    events::proxy_event(module, ProxyStage::Before, method)
}

pub(crate) fn after_event(module: ProxyModule, method: ProxyMethod) -> String {
    events::proxy_event(module, ProxyStage::After, method)
}

pub(crate) fn error_event(module: ProxyModule) -> String {
    events::proxy_event(module, ProxyStage::OnError, ProxyMethod::Text)
}

/// Result of a proxied text request, tool round-trips included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    /// Final text.
    pub text: String,
    /// Final provider response.
    pub response: ChatResponse,
    /// Tool calls executed along the way.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Provider turns taken.
    pub steps: u32,
    /// Usage over all turns.
    pub usage: Usage,
    /// The full conversation, final assistant turn included.
    pub messages: Vec<Message>,
}

/// Output of a proxied request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyOutput {
    /// From `as_text`.
    Text(TextResponse),
    /// From `as_structured`.
    Structured(StructuredResponse),
    /// From `as_stream`, aggregated once the stream is drained.
    Stream(ChatResponse),
    /// From `as_embeddings`.
    Embeddings(EmbeddingResponse),
}

impl ProxyOutput {
    /// Name of the variant, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
            Self::Stream(_) => "stream",
            Self::Embeddings(_) => "embeddings",
        }
    }
}

/// Payload of `{module}.before_{method}`. Handlers may rewrite the request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Originating module.
    pub module: ProxyModule,
    /// Terminal method.
    pub method: ProxyMethod,
    /// The materialized request.
    pub request: PendingRequest,
    /// Metadata handed to tools.
    pub metadata: Map<String, Value>,
}

/// Payload of `{module}.after_{method}`. Handlers may rewrite the output.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Originating module.
    pub module: ProxyModule,
    /// Terminal method.
    pub method: ProxyMethod,
    /// The request as sent.
    pub request: PendingRequest,
    /// What the provider produced.
    pub output: ProxyOutput,
}

/// Payload of `{module}.on_error`. Handlers may replace the error.
#[derive(Debug)]
pub struct ProxyFailure {
    /// Originating module.
    pub module: ProxyModule,
    /// Terminal method.
    pub method: ProxyMethod,
    /// The request as far as it got.
    pub request: PendingRequest,
    /// The failure that will be returned.
    pub error: Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_follow_module_and_method() {
        assert_eq!(before_event(ProxyModule::Text, ProxyMethod::Stream), "text.before_stream");
        assert_eq!(
            after_event(ProxyModule::Structured, ProxyMethod::Structured),
            "structured.after_structured"
        );
        assert_eq!(error_event(ProxyModule::Embeddings), "embeddings.on_error");
    }
}
