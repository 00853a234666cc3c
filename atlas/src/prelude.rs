//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use atlas::prelude::*;
//! ```

pub use crate::agent::{
    Agent, AgentDefinition, AgentExecution, AgentFailure, AgentResponse, ExecutionMode,
    PendingAgentRequest, StreamChunkPayload, SystemPromptPayload,
};
pub use crate::config::AtlasConfig;
pub use crate::context::ExecutionContext;
pub use crate::error::{Error, ProviderError, Result, ToolError};
pub use crate::message::{Message, Role, ToolCall};
pub use crate::pipeline::{
    Condition, ConditionalHandler, Next, PipelineHandler, PipelineHandlerExt, handler_fn,
};
pub use crate::provider::{
    ChatProvider, ChatRequest, ChatResponse, EmbeddingProvider, EmbeddingRequest,
    EmbeddingResponse,
};
pub use crate::proxy::{
    ProxyFailure, ProxyRequest, ProxyResponse, RequestCall, RequestProxy, TextResponse,
};
pub use crate::schema::{Schema, SchemaSpec};
pub use crate::stream::{ChatStream, StopReason, StreamChunk};
pub use crate::testing::{AtlasFake, FakeProvider, FakeResponse, FakeResponseSequence};
pub use crate::tool::{Tool, ToolContext, ToolResult};
pub use crate::usage::Usage;
pub use crate::{Atlas, AtlasBuilder};
