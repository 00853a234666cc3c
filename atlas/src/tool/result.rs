//! Tool results and the per-call tool context.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The outcome of a tool call, as reported back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Output value. Strings are sent verbatim, anything else as JSON.
    pub output: Value,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// A plain-text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output: Value::String(text.into()),
            is_error: false,
        }
    }

    /// A JSON result.
    #[must_use]
    pub const fn json(value: Value) -> Self {
        Self {
            output: value,
            is_error: false,
        }
    }

    /// A failed result carrying a message for the model.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::String(message.into()),
            is_error: true,
        }
    }

    /// Whether the tool failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    /// Render the result as the text content of a tool message.
    #[must_use]
    pub fn to_text(&self) -> String {
        let body = match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if self.is_error {
            format!("Error: {body}")
        } else {
            body
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<String> for ToolResult {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for ToolResult {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

/// Read-only metadata handed to every tool call.
///
/// Built from the execution context of the agent that issued the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    agent: Option<String>,
    metadata: Map<String, Value>,
}

impl ToolContext {
    /// Create a context from metadata.
    #[must_use]
    pub const fn new(metadata: Map<String, Value>) -> Self {
        Self {
            agent: None,
            metadata,
        }
    }

    /// Tag the context with the calling agent.
    #[must_use]
    pub fn for_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Key of the agent that issued the call, if any.
    #[must_use]
    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    /// Raw metadata value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Metadata value decoded as `T`. `None` if absent or of another shape.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// All metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}
