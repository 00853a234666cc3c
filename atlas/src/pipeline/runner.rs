//! Runs a named pipeline over a payload.

use std::sync::Arc;

use tracing::trace;

use crate::error::Result;

use super::handler::{Next, SharedHandler};
use super::registry::{HandlerEntry, PipelineRegistry, RuntimeHandlers};

/// Dispatches payloads through the handlers of a [`PipelineRegistry`].
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    registry: Arc<PipelineRegistry>,
}

impl PipelineRunner {
    /// Create a runner over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<PipelineRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Run the global handlers of `name`. Inactive pipelines return `data`
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns the first handler error; the remaining handlers do not run.
    pub async fn run<T: Send + 'static>(&self, name: &str, data: T) -> Result<T> {
        self.dispatch(name, data, &[]).await
    }

    /// Run `name` with global and per-call handlers merged into one chain.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub async fn run_with<T: Send + 'static>(
        &self,
        name: &str,
        data: T,
        runtime: &RuntimeHandlers,
    ) -> Result<T> {
        self.dispatch(name, data, runtime.entries(name)).await
    }

    /// Same as [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub async fn run_if_active<T: Send + 'static>(&self, name: &str, data: T) -> Result<T> {
        self.run(name, data).await
    }

    async fn dispatch<T: Send + 'static>(
        &self,
        name: &str,
        data: T,
        runtime: &[HandlerEntry],
    ) -> Result<T> {
        if !self.registry.is_active(name) {
            trace!(pipeline = name, "pipeline inactive");
            return Ok(data);
        }

        let mut entries = self.registry.entries(name);
        entries.extend_from_slice(runtime);
        if entries.is_empty() {
            return Ok(data);
        }
        entries.sort_by_key(HandlerEntry::sort_key);

        let chain: Vec<SharedHandler<T>> = entries
            .iter()
            .filter_map(|entry| entry.downcast::<T>(name))
            .collect();

        tracing::debug!(pipeline = name, handlers = chain.len(), "running pipeline");
        Next::new(&chain).run(data).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pipeline::handler::{PipelineHandler, PipelineHandlerExt, handler_fn};

    type Trail = Vec<&'static str>;

    fn push(tag: &'static str) -> impl PipelineHandler<Trail> {
        handler_fn(move |mut d: Trail| {
            d.push(tag);
            Ok(d)
        })
    }

    fn runner() -> PipelineRunner {
        PipelineRunner::new(Arc::new(PipelineRegistry::new()))
    }

    mod ordering {
        use super::*;

        #[tokio::test]
        async fn higher_priority_runs_first() {
            let runner = runner();
            runner.registry().register("p", push("low"), 1);
            runner.registry().register("p", push("high"), 10);
            runner.registry().register("p", push("low-2"), 1);

            let out = runner.run("p", Trail::new()).await.unwrap();
            assert_eq!(out, vec!["high", "low", "low-2"]);
        }

        #[tokio::test]
        async fn global_precedes_runtime_on_equal_priority() {
            let runner = runner();
            let mut runtime = RuntimeHandlers::new();
            runtime.register("p", push("runtime"), 5);
            runtime.register("p", push("runtime-high"), 20);
            runner.registry().register("p", push("global"), 5);

            let out = runner.run_with("p", Trail::new(), &runtime).await.unwrap();
            assert_eq!(out, vec!["runtime-high", "global", "runtime"]);
        }

        #[tokio::test]
        async fn runtime_handlers_only_apply_to_their_pipeline() {
            let runner = runner();
            let mut runtime = RuntimeHandlers::new();
            runtime.register("other", push("other"), 0);

            let out = runner.run_with("p", Trail::new(), &runtime).await.unwrap();
            assert!(out.is_empty());
        }
    }

    mod activation {
        use super::*;

        #[tokio::test]
        async fn inactive_pipeline_returns_input() {
            let runner = runner();
            runner.registry().register("p", push("a"), 0);
            runner.registry().set_active("p", false);

            let out = runner.run("p", vec!["in"]).await.unwrap();
            assert_eq!(out, vec!["in"]);

            let mut runtime = RuntimeHandlers::new();
            runtime.register("p", push("rt"), 0);
            let out = runner.run_with("p", vec!["in"], &runtime).await.unwrap();
            assert_eq!(out, vec!["in"]);
        }

        #[tokio::test]
        async fn undefined_pipeline_is_a_no_op() {
            let out = runner().run_if_active("nothing", vec!["in"]).await.unwrap();
            assert_eq!(out, vec!["in"]);
        }

        #[tokio::test]
        async fn conditional_handler_respects_predicate() {
            let runner = runner();
            runner
                .registry()
                .register("p", push("tagged").when(|d: &Trail| d.first() == Some(&"go")), 0);

            assert_eq!(runner.run("p", vec!["go"]).await.unwrap(), vec!["go", "tagged"]);
            assert_eq!(runner.run("p", vec!["stay"]).await.unwrap(), vec!["stay"]);
        }
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn error_aborts_chain() {
            let runner = runner();
            runner.registry().register(
                "p",
                handler_fn(|_d: Trail| Err(Error::pipeline("p", "denied"))),
                10,
            );
            runner.registry().register("p", push("never"), 0);

            let err = runner.run("p", Trail::new()).await.unwrap_err();
            assert!(matches!(err, Error::Pipeline { .. }));
        }

        #[tokio::test]
        async fn mismatched_handlers_are_skipped() {
            let runner = runner();
            runner.registry().register("p", handler_fn(|n: u32| Ok(n * 2)), 10);
            runner.registry().register("p", push("kept"), 0);

            let out = runner.run("p", Trail::new()).await.unwrap();
            assert_eq!(out, vec!["kept"]);
            assert_eq!(runner.run("p", 21_u32).await.unwrap(), 42);
        }
    }
}
