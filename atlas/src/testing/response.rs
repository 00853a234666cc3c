//! Canned responses and response sequences for the fake provider.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::ProviderError;
use crate::message::ToolCall;
use crate::provider::{ChatResponse, EmbeddingResponse};
use crate::stream::StopReason;
use crate::usage::Usage;

/// A canned provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeResponse {
    /// A chat completion.
    Chat(ChatResponse),
    /// An embeddings result.
    Embeddings(EmbeddingResponse),
    /// A provider failure.
    Error(ProviderError),
}

impl FakeResponse {
    /// A plain text completion.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chat(ChatResponse::from_text(text).with_model("fake"))
    }

    /// A completion whose text is `value` encoded as JSON.
    #[must_use]
    pub fn structured(value: Value) -> Self {
        Self::text(value.to_string())
    }

    /// A completion requesting the given tool calls.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Chat(ChatResponse::from_tool_calls(calls).with_model("fake"))
    }

    /// A completion requesting one tool call, with a generated id.
    #[must_use]
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        let id = format!("call_{}", uuid::Uuid::new_v4().simple());
        Self::tool_calls(vec![ToolCall::new(id, name, arguments)])
    }

    /// An embeddings result.
    #[must_use]
    pub fn embeddings(vectors: Vec<Vec<f32>>) -> Self {
        Self::Embeddings(EmbeddingResponse::new(vectors))
    }

    /// A provider failure.
    #[must_use]
    pub const fn error(error: ProviderError) -> Self {
        Self::Error(error)
    }

    /// Attach usage to a chat or embeddings response.
    #[must_use]
    pub fn with_usage(self, usage: Usage) -> Self {
        match self {
            Self::Chat(response) => Self::Chat(response.with_usage(usage)),
            Self::Embeddings(mut response) => {
                response.usage = Some(usage);
                Self::Embeddings(response)
            }
            other @ Self::Error(_) => other,
        }
    }

    /// Override the stop reason of a chat response.
    #[must_use]
    pub fn with_stop_reason(self, reason: StopReason) -> Self {
        match self {
            Self::Chat(response) => Self::Chat(response.with_stop_reason(reason)),
            other => other,
        }
    }
}

impl From<&str> for FakeResponse {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for FakeResponse {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<ChatResponse> for FakeResponse {
    fn from(response: ChatResponse) -> Self {
        Self::Chat(response)
    }
}

/// What a sequence returns once its queue is drained.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum WhenEmpty {
    /// Keep returning the last response handed out.
    #[default]
    RepeatLast,
    /// Return this response.
    Respond(FakeResponse),
    /// Fail the provider call.
    Fail,
}

/// A FIFO queue of canned responses.
///
/// ```rust,ignore
/// let sequence = FakeResponseSequence::new()
///     .then(FakeResponse::tool_call("lookup", json!({"id": 1})))
///     .then("All done")
///     .fail_when_empty();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeResponseSequence {
    queue: VecDeque<FakeResponse>,
    last: Option<FakeResponse>,
    when_empty: WhenEmpty,
}

impl FakeResponseSequence {
    /// Create an empty sequence that repeats its last response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response.
    #[must_use]
    pub fn then(mut self, response: impl Into<FakeResponse>) -> Self {
        self.push(response);
        self
    }

    /// Append a response in place.
    pub fn push(&mut self, response: impl Into<FakeResponse>) {
        self.queue.push_back(response.into());
    }

    /// Repeat the last response once drained (the default).
    #[must_use]
    pub fn repeat_last(mut self) -> Self {
        self.when_empty = WhenEmpty::RepeatLast;
        self
    }

    /// Return `response` once drained.
    #[must_use]
    pub fn when_empty(mut self, response: impl Into<FakeResponse>) -> Self {
        self.when_empty = WhenEmpty::Respond(response.into());
        self
    }

    /// Fail once drained.
    #[must_use]
    pub fn fail_when_empty(mut self) -> Self {
        self.when_empty = WhenEmpty::Fail;
        self
    }

    /// Number of queued responses.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Hand out the next response.
    ///
    /// A drained sequence that never handed anything out answers with an
    /// empty text response under [`WhenEmpty::RepeatLast`].
    pub fn next_response(&mut self) -> FakeResponse {
        if let Some(response) = self.queue.pop_front() {
            self.last = Some(response.clone());
            return response;
        }
        match &self.when_empty {
            WhenEmpty::RepeatLast => self
                .last
                .clone()
                .unwrap_or_else(|| FakeResponse::text("")),
            WhenEmpty::Respond(response) => response.clone(),
            WhenEmpty::Fail => FakeResponse::Error(ProviderError::invalid_request(
                "fake response sequence is exhausted",
            )),
        }
    }
}

impl<R: Into<FakeResponse>> FromIterator<R> for FakeResponseSequence {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut sequence = Self::new();
        for response in iter {
            sequence.push(response);
        }
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(response: &FakeResponse) -> Option<String> {
        match response {
            FakeResponse::Chat(chat) => chat.text(),
            _ => None,
        }
    }

    #[test]
    fn fifo_then_repeat_last() {
        let mut seq = FakeResponseSequence::new().then("a").then("b");
        assert_eq!(seq.remaining(), 2);
        assert_eq!(text_of(&seq.next_response()).as_deref(), Some("a"));
        assert_eq!(text_of(&seq.next_response()).as_deref(), Some("b"));
        assert!(seq.is_empty());
        assert_eq!(text_of(&seq.next_response()).as_deref(), Some("b"));
    }

    #[test]
    fn empty_sequence_answers_with_empty_text() {
        let mut seq = FakeResponseSequence::new();
        assert_eq!(text_of(&seq.next_response()).as_deref(), Some(""));
    }

    #[test]
    fn when_empty_responds_with_default() {
        let mut seq = FakeResponseSequence::new().then("a").when_empty("fallback");
        let _ = seq.next_response();
        assert_eq!(text_of(&seq.next_response()).as_deref(), Some("fallback"));
    }

    #[test]
    fn fail_when_empty_errors() {
        let mut seq = FakeResponseSequence::new().fail_when_empty();
        assert!(matches!(seq.next_response(), FakeResponse::Error(_)));
    }

    #[test]
    fn collect_from_texts() {
        let seq: FakeResponseSequence = ["x", "y"].into_iter().collect();
        assert_eq!(seq.remaining(), 2);
    }

    #[test]
    fn tool_call_gets_generated_id() {
        let FakeResponse::Chat(chat) = FakeResponse::tool_call("lookup", serde_json::json!({})) else {
            unreachable!("tool_call builds a chat response");
        };
        let calls = chat.tool_calls().unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
    }
}
