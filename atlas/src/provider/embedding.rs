//! Embedding request/response types and the [`EmbeddingProvider`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::usage::Usage;

/// A request to embed one or more inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Embedding model identifier.
    #[serde(default)]
    pub model: String,
    /// Inputs to embed, in order.
    #[serde(default)]
    pub input: Vec<String>,
    /// Requested vector dimensions, when the model supports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    /// Provider-specific options passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_options: Map<String, Value>,
}

impl EmbeddingRequest {
    /// Creates a new request for the given model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Appends an input.
    #[must_use]
    pub fn input(mut self, text: impl Into<String>) -> Self {
        self.input.push(text.into());
        self
    }
}

/// Embedding vectors returned by a provider, one per input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl EmbeddingResponse {
    /// Creates a response from vectors.
    #[must_use]
    pub const fn new(embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            embeddings,
            usage: None,
        }
    }

    /// Returns the first vector, if any.
    #[must_use]
    pub fn first(&self) -> Option<&[f32]> {
        self.embeddings.first().map(Vec::as_slice)
    }
}

/// Trait for providers that can produce embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input of the request.
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Get the name of this provider.
    fn provider_name(&self) -> &str;

    /// Get the default embedding model for this provider.
    fn default_embedding_model(&self) -> &str;
}

/// Type alias for an Arc-wrapped [`EmbeddingProvider`].
pub type SharedEmbeddingProvider = std::sync::Arc<dyn EmbeddingProvider>;
