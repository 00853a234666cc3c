//! Pipeline handler trait and the chain continuation.
//!
//! A [`PipelineHandler`] is middleware around a lifecycle event. It receives
//! the event payload by value plus a [`Next`] handle for the rest of the
//! chain, and returns the (possibly rewritten) payload:
//!
//! ```rust,ignore
//! struct Tag;
//!
//! #[async_trait]
//! impl PipelineHandler<AgentExecution> for Tag {
//!     async fn handle(&self, mut data: AgentExecution, next: Next<'_, AgentExecution>) -> Result<AgentExecution> {
//!         data.context = data.context.with_metadata_value("tagged", true.into());
//!         next.run(data).await
//!     }
//! }
//! ```
//!
//! Returning without calling `next.run` short-circuits the remaining
//! handlers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A shared, thread-safe [`PipelineHandler`] trait object.
pub type SharedHandler<T> = Arc<dyn PipelineHandler<T>>;

/// Middleware invoked for a pipeline whose payload type is `T`.
///
/// Payload types must be `Send + 'static` for a handler to be registered.
#[async_trait]
pub trait PipelineHandler<T>: Send + Sync {
    /// Handle the payload and optionally continue the chain.
    async fn handle(&self, data: T, next: Next<'_, T>) -> Result<T>;

    /// Label used in logs.
    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The remainder of a handler chain.
pub struct Next<'a, T> {
    chain: &'a [SharedHandler<T>],
}

impl<'a, T> Next<'a, T>
where
    T: Send + 'static,
{
    pub(crate) const fn new(chain: &'a [SharedHandler<T>]) -> Self {
        Self { chain }
    }

    /// Run the rest of the chain. Returns `data` unchanged when exhausted.
    pub async fn run(self, data: T) -> Result<T> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                tracing::trace!(handler = head.label(), remaining = rest.len(), "pipeline handler");
                head.handle(data, Next { chain: rest }).await
            }
            None => Ok(data),
        }
    }

    /// Number of handlers still to run.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.chain.len()
    }
}

impl<T> fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .finish()
    }
}

/// A handler built from a synchronous transform; see [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Adapt `Fn(T) -> Result<T>` into a handler that transforms, then continues.
///
/// ```rust,ignore
/// registry.register(events::AGENT_BEFORE_EXECUTE, handler_fn(|mut data: AgentExecution| {
///     data.input = data.input.trim().to_owned();
///     Ok(data)
/// }), 0);
/// ```
#[must_use]
pub const fn handler_fn<T, F>(f: F) -> FnHandler<F>
where
    F: Fn(T) -> Result<T> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<T, F> PipelineHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Result<T> + Send + Sync,
{
    async fn handle(&self, data: T, next: Next<'_, T>) -> Result<T> {
        let data = (self.f)(data)?;
        next.run(data).await
    }

    fn label(&self) -> &'static str {
        "handler_fn"
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Predicate deciding whether a [`ConditionalHandler`] applies to a payload.
pub type Condition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Wraps a handler so it only runs when a predicate holds.
///
/// When the predicate is false the wrapped handler is skipped and the chain
/// continues as if it were absent.
pub struct ConditionalHandler<T> {
    inner: SharedHandler<T>,
    condition: Condition<T>,
}

impl<T> ConditionalHandler<T>
where
    T: Send + 'static,
{
    /// Wrap `handler` with `condition`.
    pub fn new<H, C>(handler: H, condition: C) -> Self
    where
        H: PipelineHandler<T> + 'static,
        C: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(handler),
            condition: Arc::new(condition),
        }
    }

    /// Wrap an already shared handler.
    #[must_use]
    pub fn shared(handler: SharedHandler<T>, condition: Condition<T>) -> Self {
        Self {
            inner: handler,
            condition,
        }
    }
}

#[async_trait]
impl<T> PipelineHandler<T> for ConditionalHandler<T>
where
    T: Send + 'static,
{
    async fn handle(&self, data: T, next: Next<'_, T>) -> Result<T> {
        if (self.condition)(&data) {
            self.inner.handle(data, next).await
        } else {
            next.run(data).await
        }
    }

    fn label(&self) -> &'static str {
        self.inner.label()
    }
}

impl<T> fmt::Debug for ConditionalHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalHandler").finish_non_exhaustive()
    }
}

/// Combinators available on every handler.
pub trait PipelineHandlerExt<T>: PipelineHandler<T> + Sized + 'static
where
    T: Send + 'static,
{
    /// Only run this handler when `condition` holds for the payload.
    fn when<C>(self, condition: C) -> ConditionalHandler<T>
    where
        C: Fn(&T) -> bool + Send + Sync + 'static,
    {
        ConditionalHandler::new(self, condition)
    }
}

impl<T, H> PipelineHandlerExt<T> for H
where
    T: Send + 'static,
    H: PipelineHandler<T> + 'static,
{
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Push(&'static str);

    #[async_trait]
    impl PipelineHandler<Vec<&'static str>> for Push {
        async fn handle(
            &self,
            mut data: Vec<&'static str>,
            next: Next<'_, Vec<&'static str>>,
        ) -> Result<Vec<&'static str>> {
            data.push(self.0);
            let mut data = next.run(data).await?;
            data.push("after");
            Ok(data)
        }
    }

    struct Stop;

    #[async_trait]
    impl PipelineHandler<Vec<&'static str>> for Stop {
        async fn handle(
            &self,
            mut data: Vec<&'static str>,
            _next: Next<'_, Vec<&'static str>>,
        ) -> Result<Vec<&'static str>> {
            data.push("stop");
            Ok(data)
        }
    }

    type Shared = SharedHandler<Vec<&'static str>>;

    fn chain(handlers: Vec<Shared>) -> Vec<Shared> {
        handlers
    }

    #[tokio::test]
    async fn empty_chain_returns_input() {
        let handlers = chain(Vec::new());
        let out = Next::new(&handlers).run(vec!["in"]).await.unwrap();
        assert_eq!(out, vec!["in"]);
    }

    #[tokio::test]
    async fn handlers_wrap_like_an_onion() {
        let handlers = chain(vec![Arc::new(Push("a")) as Shared, Arc::new(Push("b")) as Shared]);
        let out = Next::new(&handlers).run(Vec::new()).await.unwrap();
        assert_eq!(out, vec!["a", "b", "after", "after"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_rest() {
        let handlers = chain(vec![Arc::new(Stop) as Shared, Arc::new(Push("never")) as Shared]);
        let out = Next::new(&handlers).run(Vec::new()).await.unwrap();
        assert_eq!(out, vec!["stop"]);
    }

    #[tokio::test]
    async fn handler_fn_transforms_then_continues() {
        let handlers = chain(vec![
            Arc::new(handler_fn(|mut d: Vec<&'static str>| {
                d.push("fn");
                Ok(d)
            })) as Shared,
            Arc::new(Push("b")) as Shared,
        ]);
        let out = Next::new(&handlers).run(Vec::new()).await.unwrap();
        assert_eq!(out, vec!["fn", "b", "after"]);
    }

    #[tokio::test]
    async fn handler_fn_error_aborts_chain() {
        let handlers = chain(vec![
            Arc::new(handler_fn(|_d: Vec<&'static str>| {
                Err(crate::Error::agent("boom"))
            })) as Shared,
            Arc::new(Push("never")) as Shared,
        ]);
        let err = Next::new(&handlers).run(Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn conditional_handler_skips_when_false() {
        let handlers = chain(vec![
            Arc::new(Stop.when(|d: &Vec<&'static str>| d.contains(&"go"))) as Shared,
            Arc::new(Push("b")) as Shared,
        ]);

        let skipped = Next::new(&handlers).run(Vec::new()).await.unwrap();
        assert_eq!(skipped, vec!["b", "after"]);

        let applied = Next::new(&handlers).run(vec!["go"]).await.unwrap();
        assert_eq!(applied, vec!["go", "stop"]);
    }

    #[test]
    fn next_reports_remaining() {
        let handlers = chain(vec![Arc::new(Stop) as Shared, Arc::new(Stop) as Shared]);
        assert_eq!(Next::new(&handlers).remaining(), 2);
    }
}
