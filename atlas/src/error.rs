//! Unified error types for Atlas.
//!
//! This module provides the error hierarchy covering:
//! - Provider errors surfaced by the wrapped provider layer
//! - Tool execution and registry errors
//! - Agent, pipeline and configuration errors

use std::fmt;

/// Result type alias for Atlas operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Atlas.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error raised by the provider layer.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Tool execution or registry error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Agent runtime error.
    #[error("Agent error: {0}")]
    Agent(String),

    /// No agent is registered under the given key.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// An agent with the given key is already registered.
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    /// A pipeline handler failed.
    #[error("Pipeline '{pipeline}' failed: {message}")]
    Pipeline {
        /// Name of the pipeline that was running.
        pipeline: String,
        /// Failure message.
        message: String,
    },

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an agent error with a message.
    #[must_use]
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Create a pipeline error.
    #[must_use]
    pub fn pipeline(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Error type for provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ProviderError {
    /// The error kind.
    pub kind: ProviderErrorKind,
    /// The provider name (e.g., "openai", "fake").
    pub provider: Option<String>,
    /// Additional error message.
    pub message: String,
    /// Optional error code from the provider.
    pub code: Option<String>,
}

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    /// Authentication or authorization failure.
    Auth,
    /// Rate limit exceeded.
    RateLimited,
    /// Invalid request parameters.
    InvalidRequest,
    /// Response format error.
    ResponseFormat,
    /// Network or connection error.
    Network,
    /// Streaming error.
    Stream,
    /// No provider registered under the requested name.
    Unknown,
    /// Feature not supported.
    NotSupported,
    /// Provider-specific error.
    Provider,
}

impl ProviderError {
    fn with_kind(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: None,
            message: message.into(),
            code: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ProviderErrorKind::Auth, message).for_provider(provider)
    }

    /// Create a rate limit error.
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::with_kind(
            ProviderErrorKind::RateLimited,
            "Rate limit exceeded. Please retry after some time.",
        )
        .for_provider(provider)
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_kind(ProviderErrorKind::InvalidRequest, message)
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::with_kind(
            ProviderErrorKind::ResponseFormat,
            format!("Expected {}, got {}", expected.into(), got.into()),
        )
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(ProviderErrorKind::Network, message)
    }

    /// Create a streaming error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::with_kind(ProviderErrorKind::Stream, message)
    }

    /// Create an unknown provider error.
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_kind(
            ProviderErrorKind::Unknown,
            format!("No provider registered as '{name}'"),
        )
        .for_provider(name)
    }

    /// Create a not supported error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::with_kind(
            ProviderErrorKind::NotSupported,
            format!("Feature not supported: {}", feature.into()),
        )
    }

    /// Create a provider-specific error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ProviderErrorKind::Provider, message).for_provider(provider)
    }

    /// Attach the provider name.
    #[must_use]
    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach a provider error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check if this is a retryable error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited | ProviderErrorKind::Network
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

/// Error type for tool execution and registration failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Error during tool execution.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Invalid arguments provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// A tool with the same name is already registered.
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    /// Generic error.
    #[error("Tool error: {0}")]
    Other(String),
}

impl ToolError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invalid arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_owned())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}
