//! The wrapped provider layer.
//!
//! Atlas never implements a provider protocol. Concrete clients implement
//! [`ChatProvider`] and/or [`EmbeddingProvider`] and are registered by name
//! in a [`ProviderRegistry`]; everything else in the crate goes through
//! these traits.

mod chat;
mod embedding;
mod registry;

pub use chat::{
    ChatProvider, ChatRequest, ChatResponse, JsonSchemaSpec, ResponseFormat, SharedChatProvider,
    StructuredResponse, ToolChoice,
};
pub use embedding::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, SharedEmbeddingProvider,
};
pub use registry::ProviderRegistry;
