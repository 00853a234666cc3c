//! Tools: callable capabilities exposed to the model.
//!
//! - [`Tool`]: typed tool trait; [`DynTool`] is its object-safe form.
//! - [`ToolRegistry`]: named tools shared across agents.
//! - [`ToolExecutor`]: runs a model-issued tool call through the
//!   `tool.*` pipelines.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas::prelude::*;
//!
//! struct Weather;
//!
//! #[derive(Deserialize)]
//! struct WeatherArgs { city: String }
//!
//! #[async_trait]
//! impl Tool for Weather {
//!     const NAME: &'static str = "weather";
//!     type Args = WeatherArgs;
//!     type Output = String;
//!     type Error = ToolError;
//!
//!     fn description(&self) -> String { "Current weather for a city".into() }
//!
//!     fn parameters(&self) -> Vec<ToolParameter> {
//!         vec![ToolParameter::string("city", "City name")]
//!     }
//!
//!     async fn call(&self, args: WeatherArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
//!         Ok(format!("Sunny in {}", args.city))
//!     }
//! }
//! ```

mod executor;
mod registry;
mod result;
mod traits;

pub use executor::{ToolCallRecord, ToolExecution, ToolExecutor, ToolFailure};
pub use registry::ToolRegistry;
pub use result::{ToolContext, ToolResult};
pub use traits::{DynTool, SharedTool, Tool};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::object_schema;

/// A tool parameter. Same builder as schema properties.
pub use crate::schema::Property as ToolParameter;

/// Definition of a tool as sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the function.
    pub name: String,
    /// What the function does; the model uses this to choose it.
    pub description: String,
    /// JSON Schema object describing the parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Create a definition whose parameter schema is built from `parameters`.
    #[must_use]
    pub fn from_parameters(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: &[ToolParameter],
    ) -> Self {
        Self::new(name, description, object_schema(parameters))
    }
}
