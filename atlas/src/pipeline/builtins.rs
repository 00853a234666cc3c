//! Built-in pipeline handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas::pipeline::{LoggingHandler, LogLevel, events};
//!
//! atlas.pipelines().register(
//!     events::AGENT_BEFORE_EXECUTE,
//!     LoggingHandler::<AgentExecution>::new("agent").with_level(LogLevel::Debug),
//!     100,
//! );
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;

use super::handler::{Next, PipelineHandler};

/// Log verbosity level for pipeline traversal events.
///
/// Maps directly to `tracing` levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace-level logging (most verbose).
    Trace,
    /// Debug-level logging.
    Debug,
    /// Info-level logging (default).
    #[default]
    Info,
    /// Warn-level logging.
    Warn,
}

/// Emit a log event at the specified level using `tracing` macros.
macro_rules! log_at_level {
    ($level:expr, $($arg:tt)*) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)*),
            LogLevel::Debug => tracing::debug!($($arg)*),
            LogLevel::Info  => tracing::info!($($arg)*),
            LogLevel::Warn  => tracing::warn!($($arg)*),
        }
    };
}

/// A pass-through handler that logs entry, exit and failures of the rest of
/// the chain.
pub struct LoggingHandler<T> {
    label: String,
    level: LogLevel,
    _payload: PhantomData<fn(T) -> T>,
}

impl<T> LoggingHandler<T> {
    /// Create a handler logging under `label` at INFO.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            level: LogLevel::default(),
            _payload: PhantomData,
        }
    }

    /// Set the log level.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl<T> PipelineHandler<T> for LoggingHandler<T>
where
    T: Send + 'static,
{
    async fn handle(&self, data: T, next: Next<'_, T>) -> Result<T> {
        let remaining = next.remaining();
        log_at_level!(self.level, pipeline = %self.label, remaining, "Pipeline entered");

        let started = Instant::now();
        let result = next.run(data).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => log_at_level!(self.level, pipeline = %self.label, elapsed_ms, "Pipeline completed"),
            Err(err) => tracing::warn!(pipeline = %self.label, elapsed_ms, error = %err, "Pipeline failed"),
        }
        result
    }

    fn label(&self) -> &'static str {
        "logging"
    }
}

impl<T> fmt::Debug for LoggingHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingHandler")
            .field("label", &self.label)
            .field("level", &self.level)
            .finish()
    }
}
