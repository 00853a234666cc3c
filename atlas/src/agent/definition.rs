//! Agent definitions.
//!
//! An agent is configuration, not behavior: which provider and model to
//! call, the system prompt, which registered tools it may use, and sampling
//! settings. Implement [`AgentDefinition`] on a unit struct, or build one
//! at runtime with [`Agent`].

use std::sync::Arc;

use convert_case::{Case, Casing};
use serde_json::{Map, Value};

use crate::schema::SchemaSpec;

/// A shared agent definition.
pub type SharedAgent = Arc<dyn AgentDefinition>;

/// Configuration for one agent.
///
/// Everything except [`key`](Self::key) and [`name`](Self::name) defaults to
/// "not set", in which case the executor falls back to the configured
/// defaults.
///
/// ```rust,ignore
/// struct SupportAgent;
///
/// impl AgentDefinition for SupportAgent {
///     fn system_prompt(&self) -> Option<&str> {
///         Some("You help {user_name} with their order.")
///     }
///
///     fn tools(&self) -> Vec<String> {
///         vec!["lookup_order".into()]
///     }
/// }
///
/// assert_eq!(SupportAgent.key(), "support");
/// ```
pub trait AgentDefinition: Send + Sync {
    /// Registry key. Defaults to the type name, kebab-cased, without a
    /// trailing `Agent`.
    fn key(&self) -> String {
        key_from_type_name(std::any::type_name::<Self>())
    }

    /// Display name. Defaults to the key in title case.
    fn name(&self) -> String {
        self.key().to_case(Case::Title)
    }

    /// What the agent is for.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Provider name.
    fn provider(&self) -> Option<&str> {
        None
    }

    /// Model identifier.
    fn model(&self) -> Option<&str> {
        None
    }

    /// System prompt template. `{variable}` placeholders are interpolated.
    fn system_prompt(&self) -> Option<&str> {
        None
    }

    /// Names of registered tools this agent may call.
    fn tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Sampling temperature.
    fn temperature(&self) -> Option<f32> {
        None
    }

    /// Response length limit.
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    /// Tool round-trip limit.
    fn max_steps(&self) -> Option<u32> {
        None
    }

    /// Provider-specific options.
    fn provider_options(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Output schema for structured calls.
    fn schema(&self) -> Option<SchemaSpec> {
        None
    }
}

/// Derive an agent key from a Rust type path.
///
/// `app::agents::CustomerSupportAgent` becomes `customer-support`.
#[must_use]
pub fn key_from_type_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let last = base.rsplit("::").next().unwrap_or(base);
    let trimmed = match last.strip_suffix("Agent") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => last,
    };
    trimmed.to_case(Case::Kebab)
}

/// An agent definition assembled at runtime.
///
/// ```rust,ignore
/// let agent = Agent::new("translator")
///     .system_prompt("Translate to {language}.")
///     .model("gpt-4o-mini")
///     .temperature(0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Agent {
    key: String,
    name: Option<String>,
    description: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    tools: Vec<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_steps: Option<u32>,
    provider_options: Map<String, Value>,
    schema: Option<SchemaSpec>,
}

impl Agent {
    /// Start an agent with the given key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the provider.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system prompt template.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Allow a registered tool.
    #[must_use]
    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    /// Allow several registered tools.
    #[must_use]
    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    /// Set the temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the response length limit.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the tool round-trip limit.
    #[must_use]
    pub const fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Set one provider option.
    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }

    /// Set the output schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<SchemaSpec>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl AgentDefinition for Agent {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.key.to_case(Case::Title))
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    fn tools(&self) -> Vec<String> {
        self.tools.clone()
    }

    fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    fn max_steps(&self) -> Option<u32> {
        self.max_steps
    }

    fn provider_options(&self) -> Map<String, Value> {
        self.provider_options.clone()
    }

    fn schema(&self) -> Option<SchemaSpec> {
        self.schema.clone()
    }
}
