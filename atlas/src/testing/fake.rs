//! [`AtlasFake`]: scripted responses and recorded-request assertions for an
//! intercepted [`Atlas`](crate::Atlas).

use std::sync::Arc;

use super::provider::{FakeProvider, RecordedRequest};
use super::response::{FakeResponse, FakeResponseSequence};

/// Handle returned by [`Atlas::fake`](crate::Atlas::fake).
///
/// Every provider name on the owning [`Atlas`](crate::Atlas) now resolves to
/// the wrapped [`FakeProvider`]. The `assert_*` methods panic with a
/// description of what was recorded, so they read naturally inside tests.
#[derive(Debug, Clone)]
pub struct AtlasFake {
    provider: Arc<FakeProvider>,
}

impl AtlasFake {
    pub(crate) const fn new(provider: Arc<FakeProvider>) -> Self {
        Self { provider }
    }

    /// The underlying fake provider.
    #[must_use]
    pub const fn provider(&self) -> &Arc<FakeProvider> {
        &self.provider
    }

    /// Queue one response on the default sequence.
    #[must_use]
    pub fn respond_with(self, response: impl Into<FakeResponse>) -> Self {
        self.provider.push(response);
        self
    }

    /// Replace the default sequence.
    #[must_use]
    pub fn sequence(self, sequence: FakeResponseSequence) -> Self {
        self.provider.set_sequence(sequence);
        self
    }

    /// Answer requests from agent `key` with `sequence`.
    #[must_use]
    pub fn for_agent(self, key: impl Into<String>, sequence: FakeResponseSequence) -> Self {
        self.provider.set_agent_sequence(key, sequence);
        self
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.provider.recorded()
    }

    /// Requests issued by agent `key`.
    #[must_use]
    pub fn recorded_for(&self, key: &str) -> Vec<RecordedRequest> {
        self.recorded()
            .into_iter()
            .filter(|r| r.agent.as_deref() == Some(key))
            .collect()
    }

    /// Forget recorded requests and queued responses.
    pub fn reset(&self) {
        self.provider.reset();
    }

    /// Assert at least one request was made.
    #[track_caller]
    pub fn assert_called(&self) {
        assert!(
            !self.recorded().is_empty(),
            "expected the fake provider to be called, but it was not"
        );
    }

    /// Assert exactly `times` requests were made.
    #[track_caller]
    pub fn assert_called_times(&self, times: usize) {
        let actual = self.recorded().len();
        assert_eq!(
            actual, times,
            "expected {times} provider call(s), got {actual}"
        );
    }

    /// Assert agent `key` issued at least one request.
    #[track_caller]
    pub fn assert_agent_called(&self, key: &str) {
        let recorded = self.recorded();
        let agents: Vec<_> = recorded.iter().filter_map(|r| r.agent.as_deref()).collect();
        assert!(
            agents.contains(&key),
            "expected agent `{key}` to be called, recorded agents: {agents:?}"
        );
    }

    /// Assert no request was made.
    #[track_caller]
    pub fn assert_nothing_called(&self) {
        let recorded = self.recorded();
        assert!(
            recorded.is_empty(),
            "expected no provider calls, got {}",
            recorded.len()
        );
    }

    /// Assert some recorded request satisfies `predicate`.
    #[track_caller]
    pub fn assert_sent<F>(&self, predicate: F)
    where
        F: Fn(&RecordedRequest) -> bool,
    {
        let recorded = self.recorded();
        assert!(
            recorded.iter().any(predicate),
            "no recorded request matched the predicate ({} recorded)",
            recorded.len()
        );
    }
}
