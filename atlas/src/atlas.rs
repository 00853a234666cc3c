//! The [`Atlas`] entry point.
//!
//! An `Atlas` bundles configuration with the provider, agent, tool and
//! pipeline registries. It is cheap to clone; clones share registries.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{AgentDefinition, AgentRegistry, PendingAgentRequest, SharedAgent};
use crate::config::{AtlasConfig, PipelineConfig};
use crate::error::Result;
use crate::pipeline::{PipelineRegistry, PipelineRunner, events};
use crate::provider::{
    ChatProvider, EmbeddingProvider, ProviderRegistry, SharedChatProvider,
    SharedEmbeddingProvider,
};
use crate::proxy::{ProxyModule, RequestProxy};
use crate::testing::{AtlasFake, FakeProvider};
use crate::tool::{SharedTool, Tool, ToolExecutor, ToolRegistry};

struct Inner {
    config: AtlasConfig,
    providers: ProviderRegistry,
    agents: AgentRegistry,
    tools: ToolRegistry,
    runner: PipelineRunner,
    tool_executor: ToolExecutor,
}

/// Registries and configuration for agents, tools, pipelines and providers.
///
/// ```rust,ignore
/// let atlas = Atlas::builder()
///     .config(AtlasConfig::load_from("atlas.toml")?.with_env())
///     .chat_provider("openai", openai_client)
///     .agent(Agent::new("support").system_prompt("You help customers."))
///     .build()?;
///
/// let reply = atlas.agent("support")?.chat("Hello").await?;
/// ```
#[derive(Clone)]
pub struct Atlas {
    inner: Arc<Inner>,
}

impl Default for Atlas {
    fn default() -> Self {
        Self::new(AtlasConfig::default())
    }
}

impl Atlas {
    /// Create an `Atlas` with empty registries.
    ///
    /// Every agent, tool and proxy pipeline is defined here. Pipelines turned
    /// off in [`PipelineConfig`] start inactive.
    #[must_use]
    pub fn new(config: AtlasConfig) -> Self {
        let pipelines = Arc::new(PipelineRegistry::new());
        define_pipelines(&pipelines, &config.pipelines);
        let runner = PipelineRunner::new(pipelines);
        info!(
            default_provider = ?config.default_provider,
            default_model = ?config.default_model,
            pipelines_enabled = config.pipelines.enabled,
            "atlas initialised"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                providers: ProviderRegistry::new(),
                agents: AgentRegistry::new(),
                tools: ToolRegistry::new(),
                tool_executor: ToolExecutor::new(runner.clone()),
                runner,
            }),
        }
    }

    /// Start assembling an `Atlas`.
    #[must_use]
    pub fn builder() -> AtlasBuilder {
        AtlasBuilder::default()
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &AtlasConfig {
        &self.inner.config
    }

    /// Provider registry.
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    /// Agent registry.
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.inner.agents
    }

    /// Tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    /// Pipeline registry.
    #[must_use]
    pub fn pipelines(&self) -> &Arc<PipelineRegistry> {
        self.inner.runner.registry()
    }

    pub(crate) fn runner(&self) -> &PipelineRunner {
        &self.inner.runner
    }

    pub(crate) fn tool_executor(&self) -> &ToolExecutor {
        &self.inner.tool_executor
    }

    /// Prepare a call to the registered agent `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AgentNotFound`](crate::Error::AgentNotFound) for
    /// unknown keys.
    pub fn agent(&self, key: &str) -> Result<PendingAgentRequest> {
        let agent = self.inner.agents.get(key)?;
        Ok(PendingAgentRequest::new(self.clone(), agent))
    }

    /// Prepare a call to an unregistered agent.
    #[must_use]
    pub fn agent_with<A: AgentDefinition + 'static>(&self, agent: A) -> PendingAgentRequest {
        self.agent_shared(Arc::new(agent))
    }

    /// Prepare a call to a shared agent.
    #[must_use]
    pub fn agent_shared(&self, agent: SharedAgent) -> PendingAgentRequest {
        PendingAgentRequest::new(self.clone(), agent)
    }

    /// A text request proxy.
    #[must_use]
    pub fn text(&self) -> RequestProxy {
        RequestProxy::new(self.clone(), ProxyModule::Text)
    }

    /// A structured-output request proxy.
    #[must_use]
    pub fn structured(&self) -> RequestProxy {
        RequestProxy::new(self.clone(), ProxyModule::Structured)
    }

    /// An embeddings request proxy.
    #[must_use]
    pub fn embeddings(&self) -> RequestProxy {
        RequestProxy::new(self.clone(), ProxyModule::Embeddings)
    }

    /// Answer every provider name with a fresh [`FakeProvider`].
    ///
    /// Lasts until [`ProviderRegistry::release`] is called on
    /// [`providers`](Self::providers).
    pub fn fake(&self) -> AtlasFake {
        self.fake_with(FakeProvider::new())
    }

    /// Answer every provider name with `provider`.
    pub fn fake_with(&self, provider: FakeProvider) -> AtlasFake {
        let provider = Arc::new(provider);
        let chat: SharedChatProvider = provider.clone();
        let embeddings: SharedEmbeddingProvider = provider.clone();
        self.inner.providers.intercept(chat, embeddings);
        AtlasFake::new(provider)
    }

    /// Resolve the chat provider and model for a request.
    ///
    /// The provider falls back to the configured default, then the registry
    /// default. The model falls back to the configured default model when
    /// the default provider is used, then to the provider's own default.
    pub(crate) fn resolve_chat(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<(SharedChatProvider, String)> {
        let config = &self.inner.config;
        let name = provider.or(config.default_provider.as_deref());
        let chat = self.inner.providers.chat(name)?;
        let model = model
            .map(str::to_owned)
            .or_else(|| {
                (provider.is_none() || provider == config.default_provider.as_deref())
                    .then(|| config.default_model.clone())
                    .flatten()
            })
            .unwrap_or_else(|| chat.default_model().to_owned());
        Ok((chat, model))
    }

    /// Resolve the embedding provider and model for a request.
    pub(crate) fn resolve_embeddings(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<(SharedEmbeddingProvider, String)> {
        let config = &self.inner.config;
        let name = provider.or(config.default_provider.as_deref());
        let embeddings = self.inner.providers.embeddings(name)?;
        let model = model
            .map(str::to_owned)
            .or_else(|| {
                (provider.is_none() || provider == config.default_provider.as_deref())
                    .then(|| config.default_embedding_model.clone())
                    .flatten()
            })
            .unwrap_or_else(|| embeddings.default_embedding_model().to_owned());
        Ok((embeddings, model))
    }
}

fn define_pipelines(registry: &PipelineRegistry, config: &PipelineConfig) {
    let proxy = events::proxy_events();
    let all = events::CORE_EVENTS
        .iter()
        .map(|(name, description)| ((*name).to_owned(), (*description).to_owned()))
        .chain(proxy);
    for (name, description) in all {
        if config.is_enabled(&name) {
            registry.define(name, description);
        } else {
            debug!(pipeline = %name, "pipeline starts inactive");
            registry.define_inactive(name, description);
        }
    }
}

impl fmt::Debug for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atlas")
            .field("config", &self.inner.config)
            .field("providers", &self.inner.providers)
            .field("agents", &self.inner.agents)
            .field("tools", &self.inner.tools)
            .field("pipelines", self.pipelines())
            .finish()
    }
}

/// Assembles an [`Atlas`].
#[derive(Default)]
pub struct AtlasBuilder {
    config: AtlasConfig,
    chat: Vec<(String, SharedChatProvider)>,
    embeddings: Vec<(String, SharedEmbeddingProvider)>,
    agents: Vec<SharedAgent>,
    tools: Vec<SharedTool>,
}

impl AtlasBuilder {
    /// Use `config`.
    #[must_use]
    pub fn config(mut self, config: AtlasConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a chat provider.
    #[must_use]
    pub fn chat_provider(mut self, name: impl Into<String>, provider: impl ChatProvider + 'static) -> Self {
        let provider: SharedChatProvider = Arc::new(provider);
        self.chat.push((name.into(), provider));
        self
    }

    /// Register an embedding provider.
    #[must_use]
    pub fn embedding_provider(
        mut self,
        name: impl Into<String>,
        provider: impl EmbeddingProvider + 'static,
    ) -> Self {
        let provider: SharedEmbeddingProvider = Arc::new(provider);
        self.embeddings.push((name.into(), provider));
        self
    }

    /// Register one client as both chat and embedding provider.
    #[must_use]
    pub fn provider<P>(mut self, name: impl Into<String>, provider: P) -> Self
    where
        P: ChatProvider + EmbeddingProvider + 'static,
    {
        let name = name.into();
        let provider = Arc::new(provider);
        let chat: SharedChatProvider = provider.clone();
        let embeddings: SharedEmbeddingProvider = provider;
        self.chat.push((name.clone(), chat));
        self.embeddings.push((name, embeddings));
        self
    }

    /// Register an agent.
    #[must_use]
    pub fn agent(mut self, agent: impl AgentDefinition + 'static) -> Self {
        let agent: SharedAgent = Arc::new(agent);
        self.agents.push(agent);
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self
    where
        T::Output: 'static,
    {
        let tool: SharedTool = Arc::new(tool);
        self.tools.push(tool);
        self
    }

    /// Build the `Atlas`.
    ///
    /// # Errors
    ///
    /// Fails on duplicate agent keys or tool names.
    pub fn build(self) -> Result<Atlas> {
        let default_provider = self.config.default_provider.clone();
        let atlas = Atlas::new(self.config);
        let inner = &atlas.inner;
        for (name, provider) in self.chat {
            inner.providers.register_chat(name, provider);
        }
        for (name, provider) in self.embeddings {
            inner.providers.register_embeddings(name, provider);
        }
        if let Some(name) = default_provider {
            inner.providers.set_default(name);
        }
        for agent in self.agents {
            inner.agents.register_shared(agent)?;
        }
        for tool in self.tools {
            inner.tools.register_shared(tool)?;
        }
        Ok(atlas)
    }
}

impl fmt::Debug for AtlasBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasBuilder")
            .field("config", &self.config)
            .field("chat", &self.chat.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("agents", &self.agents.len())
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}
