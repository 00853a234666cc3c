//! Named provider lookup.
//!
//! Atlas resolves the `provider` string of agents and proxied requests
//! through a [`ProviderRegistry`]. A fallback name covers requests that
//! never named a provider. While intercepted, every name resolves to the
//! intercepting providers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{ProviderError, Result};

use super::chat::SharedChatProvider;
use super::embedding::SharedEmbeddingProvider;

#[derive(Default)]
struct Providers {
    chat: HashMap<String, SharedChatProvider>,
    embeddings: HashMap<String, SharedEmbeddingProvider>,
    default: Option<String>,
    intercept: Option<(SharedChatProvider, SharedEmbeddingProvider)>,
}

/// Registry of chat and embedding providers keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<Providers>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chat provider. The first registered name becomes the default.
    pub fn register_chat(&self, name: impl Into<String>, provider: SharedChatProvider) {
        let name = name.into();
        debug!(provider = %name, "registering chat provider");
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.default.is_none() {
            inner.default = Some(name.clone());
        }
        inner.chat.insert(name, provider);
    }

    /// Register an embedding provider.
    pub fn register_embeddings(&self, name: impl Into<String>, provider: SharedEmbeddingProvider) {
        let name = name.into();
        debug!(provider = %name, "registering embedding provider");
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.default.is_none() {
            inner.default = Some(name.clone());
        }
        inner.embeddings.insert(name, provider);
    }

    /// Set the provider name used when a request names none.
    pub fn set_default(&self, name: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .default = Some(name.into());
    }

    /// Returns the default provider name.
    #[must_use]
    pub fn default_name(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .default
            .clone()
    }

    /// Resolve a chat provider; `None` resolves the default.
    ///
    /// # Errors
    ///
    /// Returns an unknown-provider error if nothing is registered under the name.
    pub fn chat(&self, name: Option<&str>) -> Result<SharedChatProvider> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if let Some((chat, _)) = &inner.intercept {
            return Ok(Arc::clone(chat));
        }
        let name = name
            .map(str::to_owned)
            .or_else(|| inner.default.clone())
            .ok_or_else(|| ProviderError::unknown("<default>"))?;
        inner
            .chat
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::unknown(name).into())
    }

    /// Resolve an embedding provider; `None` resolves the default.
    ///
    /// # Errors
    ///
    /// Returns an unknown-provider error if nothing is registered under the name.
    pub fn embeddings(&self, name: Option<&str>) -> Result<SharedEmbeddingProvider> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, embeddings)) = &inner.intercept {
            return Ok(Arc::clone(embeddings));
        }
        let name = name
            .map(str::to_owned)
            .or_else(|| inner.default.clone())
            .ok_or_else(|| ProviderError::unknown("<default>"))?;
        inner
            .embeddings
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::unknown(name).into())
    }

    /// Names of all registered chat providers, sorted.
    #[must_use]
    pub fn chat_names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = inner.chat.keys().cloned().collect();
        names.sort();
        names
    }

    /// Answer every provider name with the given providers until
    /// [`release`](Self::release) is called.
    pub fn intercept(&self, chat: SharedChatProvider, embeddings: SharedEmbeddingProvider) {
        debug!(provider = chat.provider_name(), "intercepting all providers");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .intercept = Some((chat, embeddings));
    }

    /// Stop intercepting and resolve registered providers again.
    pub fn release(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .intercept = None;
    }

    /// Whether providers are currently intercepted.
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .intercept
            .is_some()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("chat", &self.chat_names())
            .field("default", &self.default_name())
            .field("intercepted", &self.is_intercepted())
            .finish_non_exhaustive()
    }
}
