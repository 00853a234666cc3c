//! The [`Tool`] trait and its object-safe counterpart [`DynTool`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ToolError;
use crate::schema::object_schema;

use super::result::{ToolContext, ToolResult};
use super::{ToolDefinition, ToolParameter};

/// The core trait for all tools that agents can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: DeserializeOwned + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Error type for tool execution.
    type Error: Into<ToolError> + Send;

    /// Get the name of the tool.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Parameters the tool accepts.
    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    /// Get the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value {
        object_schema(&self.parameters())
    }

    /// Execute the tool with the given arguments.
    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, Self::Error>;

    /// Get the tool definition for function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }

    /// Call the tool with JSON arguments.
    async fn call_json(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>
    where
        Self::Output: 'static,
    {
        // Handle both string and object arguments
        let typed_args: Self::Args = match &args {
            Value::String(s) => {
                serde_json::from_str(s).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
            }
            Value::Null => serde_json::from_value(Value::Object(serde_json::Map::new()))
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
            _ => serde_json::from_value(args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
        };

        let output = self.call(typed_args, ctx).await.map_err(Into::into)?;
        match serde_json::to_value(output).map_err(|e| ToolError::Execution(e.to_string()))? {
            Value::String(text) => Ok(ToolResult::text(text)),
            value => Ok(ToolResult::json(value)),
        }
    }
}

/// A shared dynamic tool.
pub type SharedTool = Arc<dyn DynTool>;

/// Object-safe version of the Tool trait for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Call the tool with JSON arguments.
    async fn call_json(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> String {
        Tool::description(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_json(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Tool::call_json(self, args, ctx).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct AddArgs {
        x: i64,
        y: i64,
    }

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        const NAME: &'static str = "add";
        type Args = AddArgs;
        type Output = i64;
        type Error = ToolError;

        fn description(&self) -> String {
            "Add x and y".into()
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![
                ToolParameter::integer("x", "First"),
                ToolParameter::integer("y", "Second"),
            ]
        }

        async fn call(&self, args: AddArgs, _ctx: &ToolContext) -> Result<i64, ToolError> {
            Ok(args.x + args.y)
        }
    }

    #[test]
    fn definition_uses_parameters() {
        let def = Tool::definition(&Adder);
        assert_eq!(def.name, "add");
        assert_eq!(def.parameters["required"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn call_json_accepts_object_and_string() {
        let ctx = ToolContext::default();
        let tool: SharedTool = Arc::new(Adder);

        let out = tool.call_json(json!({"x": 2, "y": 3}), &ctx).await.unwrap();
        assert_eq!(out, ToolResult::json(json!(5)));

        let out = tool.call_json(json!(r#"{"x": 1, "y": 1}"#), &ctx).await.unwrap();
        assert_eq!(out.to_text(), "2");
    }

    #[tokio::test]
    async fn invalid_arguments_error() {
        let err = Tool::call_json(&Adder, json!({"x": "nope"}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
