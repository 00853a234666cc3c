//! Well-known pipeline names.
//!
//! Every name here is defined by [`Atlas::new`](crate::Atlas::new). Proxy
//! events are built from a module, a [`ProxyStage`] and a method with
//! [`proxy_event`].

use crate::proxy::{ProxyMethod, ProxyModule};

/// Before an agent executes. Payload: [`AgentExecution`](crate::agent::AgentExecution).
pub const AGENT_BEFORE_EXECUTE: &str = "agent.before_execute";
/// After an agent executes, with the response set.
pub const AGENT_AFTER_EXECUTE: &str = "agent.after_execute";
/// Before the system prompt is interpolated. Payload: [`SystemPromptPayload`](crate::agent::SystemPromptPayload).
pub const AGENT_SYSTEM_PROMPT_BEFORE_BUILD: &str = "agent.system_prompt.before_build";
/// After the system prompt is rendered.
pub const AGENT_SYSTEM_PROMPT_AFTER_BUILD: &str = "agent.system_prompt.after_build";
/// Once per streamed chunk. Payload: [`StreamChunkPayload`](crate::agent::StreamChunkPayload).
pub const AGENT_STREAM_ON_CHUNK: &str = "agent.stream.on_chunk";
/// When an agent execution fails. Payload: [`AgentFailure`](crate::agent::AgentFailure).
pub const AGENT_ON_ERROR: &str = "agent.on_error";

/// Before a tool runs. Payload: [`ToolExecution`](crate::tool::ToolExecution).
pub const TOOL_BEFORE_EXECUTE: &str = "tool.before_execute";
/// After a tool runs, with the result set.
pub const TOOL_AFTER_EXECUTE: &str = "tool.after_execute";
/// When a tool fails. Payload: [`ToolFailure`](crate::tool::ToolFailure).
pub const TOOL_ON_ERROR: &str = "tool.on_error";

/// Where a proxy pipeline sits around the terminal call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyStage {
    /// `{module}.before_{method}`.
    Before,
    /// `{module}.after_{method}`.
    After,
    /// `{module}.on_error`.
    OnError,
}

/// Build a proxy event name: `{module}.before_{method}`,
/// `{module}.after_{method}` or `{module}.on_error`.
#[must_use]
pub fn proxy_event(module: ProxyModule, stage: ProxyStage, method: ProxyMethod) -> String {
    match stage {
        ProxyStage::Before => format!("{module}.before_{method}"),
        ProxyStage::After => format!("{module}.after_{method}"),
        ProxyStage::OnError => format!("{module}.on_error"),
    }
}

/// All agent and tool pipeline names with descriptions.
pub const CORE_EVENTS: [(&str, &str); 9] = [
    (AGENT_BEFORE_EXECUTE, "Runs before an agent executes"),
    (AGENT_AFTER_EXECUTE, "Runs after an agent produced its response"),
    (AGENT_SYSTEM_PROMPT_BEFORE_BUILD, "Runs before the system prompt is interpolated"),
    (AGENT_SYSTEM_PROMPT_AFTER_BUILD, "Runs after the system prompt is rendered"),
    (AGENT_STREAM_ON_CHUNK, "Runs for every streamed chunk"),
    (AGENT_ON_ERROR, "Runs when an agent execution fails"),
    (TOOL_BEFORE_EXECUTE, "Runs before a tool executes"),
    (TOOL_AFTER_EXECUTE, "Runs after a tool executes"),
    (TOOL_ON_ERROR, "Runs when a tool fails"),
];

/// Every proxy pipeline name with a description.
#[must_use]
pub fn proxy_events() -> Vec<(String, String)> {
    let mut events = Vec::new();
    for module in ProxyModule::ALL {
        for &method in module.methods() {
            events.push((
                proxy_event(module, ProxyStage::Before, method),
                format!("Runs before {module} {method} requests"),
            ));
            events.push((
                proxy_event(module, ProxyStage::After, method),
                format!("Runs after {module} {method} requests"),
            ));
        }
        events.push((
            proxy_event(module, ProxyStage::OnError, ProxyMethod::Text),
            format!("Runs when a {module} request fails"),
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_event_names() {
        assert_eq!(
            proxy_event(ProxyModule::Text, ProxyStage::Before, ProxyMethod::Stream),
            "text.before_stream"
        );
        assert_eq!(
            proxy_event(ProxyModule::Structured, ProxyStage::After, ProxyMethod::Structured),
            "structured.after_structured"
        );
        assert_eq!(
            proxy_event(ProxyModule::Embeddings, ProxyStage::OnError, ProxyMethod::Embeddings),
            "embeddings.on_error"
        );
    }

    #[test]
    fn proxy_events_cover_every_method() {
        let names: Vec<String> = proxy_events().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"text.before_text".to_owned()));
        assert!(names.contains(&"text.after_stream".to_owned()));
        assert!(names.contains(&"embeddings.before_embeddings".to_owned()));
        assert!(names.contains(&"structured.on_error".to_owned()));
        assert_eq!(names.len(), 11);
    }
}
