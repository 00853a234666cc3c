//! Agents: named provider configurations with a system prompt and tools.
//!
//! - [`AgentDefinition`] describes an agent; [`Agent`] builds one at runtime.
//! - [`AgentRegistry`] stores definitions by key.
//! - [`PendingAgentRequest`] configures one call and runs it through the
//!   [`AgentExecutor`].
//! - [`SystemPromptBuilder`] interpolates prompt templates and appends
//!   sections.
//!
//! ```rust,ignore
//! atlas.agents().register(
//!     Agent::new("support")
//!         .system_prompt("You help {user_name}.")
//!         .tool("lookup_order"),
//! )?;
//!
//! let response = atlas
//!     .agent("support")?
//!     .with_variable("user_name", "Ada")
//!     .chat("Where is order 42?")
//!     .await?;
//! println!("{}", response.text());
//! ```

mod definition;
mod executor;
mod prompt;
mod registry;
mod request;
mod response;
mod runner;

pub use definition::{Agent, AgentDefinition, SharedAgent, key_from_type_name};
pub use executor::{
    AgentExecution, AgentExecutor, AgentFailure, ExecutionOptions, StreamChunkPayload,
};
pub use prompt::{SystemPromptBuilder, SystemPromptPayload, interpolate};
pub use registry::AgentRegistry;
pub use request::PendingAgentRequest;
pub use response::{AgentResponse, ExecutionMode};

pub(crate) use runner::StepRunner;
