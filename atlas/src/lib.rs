//! Atlas - agents, tools and pipeline hooks over a pluggable LLM provider layer.
//!
//! An [`Atlas`] holds four registries:
//!
//! - [`agent::AgentRegistry`]: named agents with a system prompt template,
//!   tools and provider settings.
//! - [`tool::ToolRegistry`]: typed tools the model may call.
//! - [`pipeline::PipelineRegistry`]: ordered middleware attached to named
//!   events such as `agent.before_execute` or `text.after_text`.
//! - [`provider::ProviderRegistry`]: the chat and embedding clients.
//!
//! Every call is stateless. Conversation history, prompt variables and
//! metadata travel in an [`ExecutionContext`] supplied by the caller.
//!
//! ```rust,ignore
//! use atlas::prelude::*;
//!
//! let atlas = Atlas::builder()
//!     .chat_provider("openai", client)
//!     .agent(Agent::new("support").system_prompt("You help {user_name}."))
//!     .build()?;
//!
//! let reply = atlas
//!     .agent("support")?
//!     .with_variable("user_name", "Ada")
//!     .chat("Where is my order?")
//!     .await?;
//!
//! let summary = atlas
//!     .text()
//!     .with_prompt("Summarise the Odyssey in one line")
//!     .as_text()
//!     .await?;
//! ```
//!
//! In tests, [`Atlas::fake`] swaps every provider for a scripted
//! [`testing::FakeProvider`] and records what was sent.

pub mod agent;
mod atlas;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod prelude;
pub mod provider;
pub mod proxy;
pub mod retry;
pub mod schema;
pub mod stream;
pub mod testing;
pub mod tool;
pub mod usage;

pub use atlas::{Atlas, AtlasBuilder};
pub use config::AtlasConfig;
pub use context::ExecutionContext;
pub use error::{Error, ProviderError, Result, ToolError};
