//! Client-side retry around provider calls.
//!
//! A [`RetryConfig`] travels with a request (see
//! [`RequestProxy::with_client_retry`](crate::proxy::RequestProxy::with_client_retry))
//! and is applied by [`retry_async`] around each provider call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Predicate deciding whether an error is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Retry configuration for provider calls.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub times: u32,
    /// Delay before the first retry in milliseconds.
    pub delay_ms: u64,
    /// Exponential backoff multiplier.
    pub multiplier: f64,
    /// Whether to randomize delays.
    pub jitter: bool,
    /// Custom retry predicate. Defaults to [`Error::is_retryable`].
    #[serde(skip)]
    pub when: Option<RetryPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            times: 3,
            delay_ms: 1000,
            multiplier: 2.0,
            jitter: true,
            when: None,
        }
    }
}

impl RetryConfig {
    /// `times` attempts with a fixed `delay_ms` between them.
    #[must_use]
    pub fn new(times: u32, delay_ms: u64) -> Self {
        Self {
            times,
            delay_ms,
            multiplier: 1.0,
            jitter: false,
            when: None,
        }
    }

    /// A single attempt.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, 0)
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Only retry errors matching `predicate`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(predicate));
        self
    }

    /// Whether `err` should be retried.
    #[must_use]
    pub fn should_retry(&self, err: &Error) -> bool {
        self.when
            .as_ref()
            .map_or_else(|| err.is_retryable(), |when| when(err))
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let base = self.delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let factor = if self.jitter {
            fastrand::f64().mul_add(0.5, 0.5)
        } else {
            1.0
        };
        let millis = (base * factor).round().clamp(0.0, 3_600_000.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = millis as u64;
        Duration::from_millis(millis)
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("times", &self.times)
            .field("delay_ms", &self.delay_ms)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("when", &self.when.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the attempts
/// are used up.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_async<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.times.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && config.should_retry(&err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retrying provider call"
                );
                if !delay.is_zero() {
                    futures_timer::Delay::new(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
