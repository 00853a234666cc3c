//! What an agent execution returns.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::stream::StopReason;
use crate::tool::ToolCallRecord;
use crate::usage::Usage;

/// How an agent was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plain chat with tool round-trips.
    Chat,
    /// Chat constrained to the agent's output schema.
    Structured,
    /// A single streamed provider turn.
    Stream,
}

/// The result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Key of the agent that answered.
    pub agent: String,
    /// Final text, if any.
    pub text: Option<String>,
    /// Decoded output for structured calls.
    pub structured: Option<Value>,
    /// Tool calls executed along the way.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Usage summed over all provider turns.
    pub usage: Usage,
    /// Provider turns taken.
    pub steps: u32,
    /// Why the final turn stopped.
    pub stop_reason: StopReason,
    /// Execution metadata, as left by the pipelines.
    pub metadata: Map<String, Value>,
    /// The full conversation, final assistant turn included.
    pub messages: Vec<Message>,
}

impl AgentResponse {
    /// Final text, or an empty string.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Whether any tool ran.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether the step limit cut the execution short.
    #[must_use]
    pub const fn hit_step_limit(&self) -> bool {
        self.stop_reason.is_tool_call()
    }

    /// Deserialize the structured output.
    ///
    /// # Errors
    ///
    /// Fails if the call was not structured or the value does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .structured
            .as_ref()
            .ok_or_else(|| Error::agent(format!("agent `{}` returned no structured output", self.agent)))?;
        Ok(T::deserialize(value)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn response(structured: Option<Value>) -> AgentResponse {
        AgentResponse {
            agent: "a".into(),
            text: None,
            structured,
            tool_calls: Vec::new(),
            usage: Usage::zero(),
            steps: 1,
            stop_reason: StopReason::Stop,
            metadata: Map::new(),
            messages: Vec::new(),
        }
    }

    #[test]
    fn parse_structured_output() {
        #[derive(Deserialize)]
        struct City {
            name: String,
        }
        let city: City = response(Some(json!({"name": "Lyon"}))).parse().unwrap();
        assert_eq!(city.name, "Lyon");
    }

    #[test]
    fn parse_without_structured_output_fails() {
        assert!(response(None).parse::<Value>().is_err());
        assert_eq!(response(None).text(), "");
    }
}
