//! Atlas configuration.
//!
//! Settings are layered:
//! 1. Default values
//! 2. A TOML file (`atlas.toml`)
//! 3. Environment variables
//!
//! ```toml
//! default_provider = "openai"
//! default_model = "gpt-4o"
//!
//! [agents]
//! max_steps = 8
//! temperature = 0.2
//!
//! [pipelines]
//! enabled = true
//! disabled = ["agent.stream.on_chunk"]
//!
//! [retry]
//! times = 3
//! delay_ms = 500
//! multiplier = 2.0
//! jitter = true
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::retry::RetryConfig;

/// Environment variable overriding [`AtlasConfig::default_provider`].
pub const ENV_DEFAULT_PROVIDER: &str = "ATLAS_DEFAULT_PROVIDER";
/// Environment variable overriding [`AtlasConfig::default_model`].
pub const ENV_DEFAULT_MODEL: &str = "ATLAS_DEFAULT_MODEL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Provider used when an agent or request names none.
    pub default_provider: Option<String>,
    /// Model used when an agent or request names none.
    pub default_model: Option<String>,
    /// Embedding model used when an embeddings request names none.
    pub default_embedding_model: Option<String>,
    /// Agent defaults.
    pub agents: AgentDefaults,
    /// Pipeline switches.
    pub pipelines: PipelineConfig,
    /// Client retry applied to every provider call unless overridden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// Defaults applied to agents that leave a setting unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Maximum provider turns per execution.
    pub max_steps: u32,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens per response.
    pub max_tokens: Option<u32>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_steps: 10,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When false every built-in pipeline starts inactive.
    pub enabled: bool,
    /// Pipelines that start inactive.
    pub disabled: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Whether `name` should start active.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled && !self.disabled.iter().any(|d| d == name)
    }
}

impl AtlasConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the document is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read, or a
    /// configuration error if it does not parse.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Merge environment variables into the configuration.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(provider) = std::env::var(ENV_DEFAULT_PROVIDER)
            && !provider.is_empty()
        {
            self.default_provider = Some(provider);
        }

        if let Ok(model) = std::env::var(ENV_DEFAULT_MODEL)
            && !model.is_empty()
        {
            self.default_model = Some(model);
        }

        self
    }

    /// Set the default provider.
    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Set the default model.
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Validate the configuration and return any issues found.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.default_provider.is_none() {
            issues.push(ConfigIssue::warning(
                "default_provider",
                "No default provider set. Agents must name a provider. Set ATLAS_DEFAULT_PROVIDER.",
            ));
        }

        if self.agents.max_steps == 0 {
            issues.push(ConfigIssue::error(
                "agents.max_steps",
                "Max steps must be at least 1",
            ));
        }

        if let Some(temperature) = self.agents.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            issues.push(ConfigIssue::error(
                "agents.temperature",
                "Temperature must be between 0.0 and 2.0",
            ));
        }

        if let Some(retry) = &self.retry {
            if retry.times == 0 {
                issues.push(ConfigIssue::error(
                    "retry.times",
                    "Retry times must be at least 1",
                ));
            }
            if retry.multiplier < 1.0 {
                issues.push(ConfigIssue::warning(
                    "retry.multiplier",
                    "Multipliers below 1.0 are treated as 1.0",
                ));
            }
        }

        if !self.pipelines.enabled && !self.pipelines.disabled.is_empty() {
            issues.push(ConfigIssue::warning(
                "pipelines.disabled",
                "Pipelines are globally disabled; the disabled list has no effect",
            ));
        }

        issues
    }

    /// Check if the configuration is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|issue| issue.level != IssueLevel::Error)
    }
}

/// A configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// Issue severity level.
    pub level: IssueLevel,
    /// Configuration path (e.g., `agents.max_steps`).
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl ConfigIssue {
    /// Create an error-level issue.
    #[must_use]
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a warning-level issue.
    #[must_use]
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            IssueLevel::Error => "ERROR",
            IssueLevel::Warning => "WARN",
        };
        write!(f, "[{}] {}: {}", prefix, self.path, self.message)
    }
}

/// Severity level for configuration issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// Error that prevents Atlas from running correctly.
    Error,
    /// Warning about potential issues.
    Warning,
}
