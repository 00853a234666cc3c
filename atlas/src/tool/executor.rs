//! Executes model-issued tool calls through the `tool.*` pipelines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::{Error, Result, ToolError};
use crate::message::ToolCall;
use crate::pipeline::{PipelineRunner, RuntimeHandlers, events};

use super::result::{ToolContext, ToolResult};
use super::traits::SharedTool;

/// Payload of `tool.before_execute` and `tool.after_execute`.
///
/// A `before` handler that sets `result` pre-empts the tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Tool name as requested by the model.
    pub tool: String,
    /// Provider-assigned call id.
    pub call_id: String,
    /// Decoded arguments.
    pub arguments: Value,
    /// Context handed to the tool.
    pub context: ToolContext,
    /// The result, once known.
    pub result: Option<ToolResult>,
}

/// Payload of `tool.on_error`.
///
/// Handlers may set `result` to replace the error message sent to the model.
#[derive(Debug)]
pub struct ToolFailure {
    /// Tool name as requested by the model.
    pub tool: String,
    /// Provider-assigned call id.
    pub call_id: String,
    /// Decoded arguments.
    pub arguments: Value,
    /// Context handed to the tool.
    pub context: ToolContext,
    /// What went wrong.
    pub error: Error,
    /// Replacement result.
    pub result: Option<ToolResult>,
}

/// A completed tool call, as reported on an agent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Provider-assigned call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments the model sent.
    pub arguments: Value,
    /// What the tool returned.
    pub result: ToolResult,
}

impl From<ToolExecution> for ToolCallRecord {
    fn from(execution: ToolExecution) -> Self {
        Self {
            id: execution.call_id,
            name: execution.tool,
            arguments: execution.arguments,
            result: execution
                .result
                .unwrap_or_else(|| ToolResult::error("tool produced no result")),
        }
    }
}

/// Runs tool calls with pipeline hooks and error capture.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    runner: PipelineRunner,
}

impl ToolExecutor {
    /// Create an executor dispatching through `runner`.
    #[must_use]
    pub const fn new(runner: PipelineRunner) -> Self {
        Self { runner }
    }

    /// Execute `call` against the matching tool in `tools`.
    ///
    /// Tool failures, unknown tools and failing `before`/`after` handlers are
    /// routed through `tool.on_error` and turned into an error
    /// [`ToolResult`] so the model can react.
    ///
    /// # Errors
    ///
    /// Only fails if a `tool.on_error` handler itself fails.
    pub async fn execute(
        &self,
        tools: &[SharedTool],
        call: &ToolCall,
        context: &ToolContext,
        runtime: &RuntimeHandlers,
    ) -> Result<ToolExecution> {
        let span = info_span!("atlas.tool", tool = %call.name, call_id = %call.id);
        async {
            let execution = ToolExecution {
                tool: call.name.clone(),
                call_id: call.id.clone(),
                arguments: call.arguments_value(),
                context: context.clone(),
                result: None,
            };

            let failed = execution.clone();
            match self.run(tools, execution, runtime).await {
                Ok(execution) => Ok(execution),
                Err(error) => self.recover(failed, error, runtime).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        tools: &[SharedTool],
        execution: ToolExecution,
        runtime: &RuntimeHandlers,
    ) -> Result<ToolExecution> {
        let mut execution = self
            .runner
            .run_with(events::TOOL_BEFORE_EXECUTE, execution, runtime)
            .await?;

        if execution.result.is_some() {
            debug!("tool call pre-empted by pipeline");
        } else {
            let tool = tools
                .iter()
                .find(|t| t.name() == execution.tool)
                .ok_or_else(|| ToolError::not_found(&execution.tool))?;
            let result = tool
                .call_json(execution.arguments.clone(), &execution.context)
                .await?;
            debug!(is_error = result.is_error(), "tool completed");
            execution.result = Some(result);
        }

        self.runner
            .run_with(events::TOOL_AFTER_EXECUTE, execution, runtime)
            .await
    }

    async fn recover(
        &self,
        execution: ToolExecution,
        error: Error,
        runtime: &RuntimeHandlers,
    ) -> Result<ToolExecution> {
        warn!(error = %error, "tool call failed");
        let failure = ToolFailure {
            tool: execution.tool,
            call_id: execution.call_id,
            arguments: execution.arguments,
            context: execution.context,
            error,
            result: None,
        };
        let failure = self
            .runner
            .run_with(events::TOOL_ON_ERROR, failure, runtime)
            .await?;

        let result = failure
            .result
            .unwrap_or_else(|| ToolResult::error(failure.error.to_string()));
        Ok(ToolExecution {
            tool: failure.tool,
            call_id: failure.call_id,
            arguments: failure.arguments,
            context: failure.context,
            result: Some(result),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::pipeline::{PipelineRegistry, handler_fn};
    use crate::tool::Tool;

    #[derive(Deserialize)]
    struct DivideArgs {
        a: f64,
        b: f64,
    }

    struct Divide;

    #[async_trait]
    impl Tool for Divide {
        const NAME: &'static str = "divide";
        type Args = DivideArgs;
        type Output = f64;
        type Error = ToolError;

        fn description(&self) -> String {
            "Divide a by b".into()
        }

        async fn call(&self, args: DivideArgs, _ctx: &ToolContext) -> std::result::Result<f64, ToolError> {
            if args.b == 0.0 {
                return Err(ToolError::execution("division by zero"));
            }
            Ok(args.a / args.b)
        }
    }

    fn setup() -> (ToolExecutor, Vec<SharedTool>) {
        let runner = PipelineRunner::new(Arc::new(PipelineRegistry::new()));
        (ToolExecutor::new(runner), vec![Arc::new(Divide) as SharedTool])
    }

    fn call(args: Value) -> ToolCall {
        ToolCall::new("call_1", "divide", args)
    }

    mod success {
        use super::*;

        #[tokio::test]
        async fn runs_tool() {
            let (executor, tools) = setup();
            let out = executor
                .execute(&tools, &call(json!({"a": 6, "b": 3})), &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap();
            assert_eq!(out.result, Some(ToolResult::json(json!(2.0))));
            assert_eq!(out.call_id, "call_1");
        }

        #[tokio::test]
        async fn before_handler_can_preempt() {
            let (executor, tools) = setup();
            let mut runtime = RuntimeHandlers::new();
            runtime.register(
                events::TOOL_BEFORE_EXECUTE,
                handler_fn(|mut exec: ToolExecution| {
                    exec.result = Some(ToolResult::text("cached"));
                    Ok(exec)
                }),
                0,
            );

            let out = executor
                .execute(&tools, &call(json!({"a": 1, "b": 0})), &ToolContext::default(), &runtime)
                .await
                .unwrap();
            assert_eq!(out.result, Some(ToolResult::text("cached")));
        }

        #[tokio::test]
        async fn after_handler_rewrites_result() {
            let (executor, tools) = setup();
            executor.runner.registry().register(
                events::TOOL_AFTER_EXECUTE,
                handler_fn(|mut exec: ToolExecution| {
                    let text = exec.result.as_ref().map(ToolResult::to_text).unwrap_or_default();
                    exec.result = Some(ToolResult::text(format!("result={text}")));
                    Ok(exec)
                }),
                0,
            );

            let out = executor
                .execute(&tools, &call(json!({"a": 4, "b": 2})), &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap();
            assert_eq!(out.result.unwrap().to_text(), "result=2.0");
        }
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn tool_error_becomes_error_result() {
            let (executor, tools) = setup();
            let out = executor
                .execute(&tools, &call(json!({"a": 1, "b": 0})), &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap();
            let result = out.result.unwrap();
            assert!(result.is_error());
            assert!(result.to_text().contains("division by zero"));
        }

        #[tokio::test]
        async fn unknown_tool_becomes_error_result() {
            let (executor, tools) = setup();
            let call = ToolCall::new("c", "missing", json!({}));
            let out = executor
                .execute(&tools, &call, &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap();
            assert!(out.result.unwrap().to_text().contains("missing"));
        }

        #[tokio::test]
        async fn on_error_handler_can_replace_result() {
            let (executor, tools) = setup();
            executor.runner.registry().register(
                events::TOOL_ON_ERROR,
                handler_fn(|mut failure: ToolFailure| {
                    failure.result = Some(ToolResult::text("fallback"));
                    Ok(failure)
                }),
                0,
            );

            let out = executor
                .execute(&tools, &call(json!("not json")), &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap();
            assert_eq!(out.result, Some(ToolResult::text("fallback")));
        }

        #[tokio::test]
        async fn failing_on_error_handler_propagates() {
            let (executor, tools) = setup();
            executor.runner.registry().register(
                events::TOOL_ON_ERROR,
                handler_fn(|_f: ToolFailure| Err(Error::pipeline(events::TOOL_ON_ERROR, "nope"))),
                0,
            );

            let err = executor
                .execute(&tools, &call(json!({"a": 1, "b": 0})), &ToolContext::default(), &RuntimeHandlers::new())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Pipeline { .. }));
        }
    }
}
