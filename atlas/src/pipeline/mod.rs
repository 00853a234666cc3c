//! Pipelines: named, priority-ordered middleware around lifecycle events.
//!
//! - [`PipelineRegistry`] stores pipeline definitions and global handlers.
//! - [`PipelineRunner`] dispatches a payload through a pipeline, merging in
//!   any per-call [`RuntimeHandlers`].
//! - [`ConditionalHandler`] gates a handler on a predicate.
//! - [`events`] lists the pipelines Atlas fires.

mod builtins;
pub mod events;
mod handler;
mod registry;
mod runner;

pub use builtins::{LogLevel, LoggingHandler};
pub use handler::{
    Condition, ConditionalHandler, FnHandler, Next, PipelineHandler, PipelineHandlerExt,
    SharedHandler, handler_fn,
};
pub use registry::{PipelineDefinition, PipelineRegistry, RuntimeHandlers};
pub use runner::PipelineRunner;
