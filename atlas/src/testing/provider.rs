//! A provider that answers from canned responses and records every request.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::message::Role;
use crate::provider::{
    ChatProvider, ChatRequest, ChatResponse, EmbeddingProvider, EmbeddingRequest,
    EmbeddingResponse,
};
use crate::stream::{ChatStream, StreamChunk};

use super::response::{FakeResponse, FakeResponseSequence};

/// Vector length used when a chat response is consumed by an embeddings call.
const PLACEHOLDER_DIMENSIONS: u32 = 8;

/// Which provider entry point a request went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedKind {
    /// [`ChatProvider::chat`].
    Chat,
    /// [`ChatProvider::chat_stream`].
    Stream,
    /// [`EmbeddingProvider::embed`].
    Embeddings,
}

/// The request body a fake received.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPayload {
    /// A chat or streaming request.
    Chat(ChatRequest),
    /// An embeddings request.
    Embeddings(EmbeddingRequest),
}

/// One request seen by a [`FakeProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Entry point used.
    pub kind: RecordedKind,
    /// Agent that issued the request, if any.
    pub agent: Option<String>,
    /// The request itself.
    pub payload: RecordedPayload,
}

impl RecordedRequest {
    /// The chat request, if this was a chat or stream call.
    #[must_use]
    pub const fn chat(&self) -> Option<&ChatRequest> {
        match &self.payload {
            RecordedPayload::Chat(request) => Some(request),
            RecordedPayload::Embeddings(_) => None,
        }
    }

    /// The embeddings request, if this was an embeddings call.
    #[must_use]
    pub const fn embeddings(&self) -> Option<&EmbeddingRequest> {
        match &self.payload {
            RecordedPayload::Embeddings(request) => Some(request),
            RecordedPayload::Chat(_) => None,
        }
    }

    /// Model named by the request.
    #[must_use]
    pub fn model(&self) -> &str {
        match &self.payload {
            RecordedPayload::Chat(request) => &request.model,
            RecordedPayload::Embeddings(request) => &request.model,
        }
    }

    /// Text of the last user message of a chat request.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.chat()?
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.as_deref())
    }

    /// System prompt of a chat request.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.chat().and_then(ChatRequest::system_prompt)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    default: FakeResponseSequence,
    agents: HashMap<String, FakeResponseSequence>,
    recorded: Vec<RecordedRequest>,
}

impl FakeState {
    fn next_response(&mut self, agent: Option<&str>) -> FakeResponse {
        match agent.and_then(|key| self.agents.get_mut(key)) {
            Some(sequence) => sequence.next_response(),
            None => self.default.next_response(),
        }
    }
}

/// A chat and embeddings provider backed by [`FakeResponseSequence`]s.
///
/// Requests issued by an agent with its own sequence are answered from that
/// sequence; everything else uses the default sequence.
///
/// ```rust,ignore
/// let fake = FakeProvider::new().with_responses(["Hello!", "Goodbye!"]);
/// let response = fake.chat(&ChatRequest::new("any").user("hi")).await?;
/// assert_eq!(response.text().as_deref(), Some("Hello!"));
/// ```
pub struct FakeProvider {
    name: String,
    state: Mutex<FakeState>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    /// Create a fake named `fake` with an empty default sequence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "fake".to_owned(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Rename the fake.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue responses on the default sequence.
    #[must_use]
    pub fn with_responses<I, R>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<FakeResponse>,
    {
        for response in responses {
            self.push(response);
        }
        self
    }

    /// Queue one response on the default sequence.
    pub fn push(&self, response: impl Into<FakeResponse>) {
        self.state().default.push(response);
    }

    /// Replace the default sequence.
    pub fn set_sequence(&self, sequence: FakeResponseSequence) {
        self.state().default = sequence;
    }

    /// Answer requests from `agent` with `sequence`.
    pub fn set_agent_sequence(&self, agent: impl Into<String>, sequence: FakeResponseSequence) {
        self.state().agents.insert(agent.into(), sequence);
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.state().recorded.clone()
    }

    /// Forget recorded requests and queued responses.
    pub fn reset(&self) {
        *self.state() = FakeState::default();
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, kind: RecordedKind, agent: Option<String>, payload: RecordedPayload) -> FakeResponse {
        let mut state = self.state();
        let response = state.next_response(agent.as_deref());
        debug!(provider = %self.name, ?kind, agent = ?agent, "fake provider answering");
        state.recorded.push(RecordedRequest {
            kind,
            agent,
            payload,
        });
        response
    }

    fn expect_chat(&self, response: FakeResponse) -> Result<ChatResponse> {
        match response {
            FakeResponse::Chat(chat) => Ok(chat),
            FakeResponse::Error(err) => Err(err.for_provider(self.name.clone()).into()),
            FakeResponse::Embeddings(_) => Err(ProviderError::response_format(
                "a chat response",
                "embeddings",
            )
            .for_provider(self.name.clone())
            .into()),
        }
    }
}

/// Split a chat response into the chunks a streaming provider would send.
fn chunks_for(response: &ChatResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    if let Some(text) = response.message.content.as_deref() {
        chunks.extend(text.split_inclusive(' ').map(StreamChunk::text));
    }
    for (index, call) in response.tool_calls().unwrap_or_default().iter().enumerate() {
        chunks.push(StreamChunk::tool_use_start(index, &call.id, &call.name));
        chunks.push(StreamChunk::tool_use_delta(index, call.arguments_value().to_string()));
    }
    if let Some(usage) = response.usage {
        chunks.push(StreamChunk::Usage(usage));
    }
    chunks.push(StreamChunk::done(Some(response.stop_reason)));
    chunks
}

#[async_trait]
impl ChatProvider for FakeProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let agent = request.agent().map(str::to_owned);
        let response = self.answer(
            RecordedKind::Chat,
            agent,
            RecordedPayload::Chat(request.clone()),
        );
        self.expect_chat(response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let agent = request.agent().map(str::to_owned);
        let response = self.answer(
            RecordedKind::Stream,
            agent,
            RecordedPayload::Chat(request.clone()),
        );
        let chat = self.expect_chat(response)?;
        let chunks = chunks_for(&chat);
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let response = self.answer(
            RecordedKind::Embeddings,
            None,
            RecordedPayload::Embeddings(request.clone()),
        );
        match response {
            FakeResponse::Embeddings(embeddings) => Ok(embeddings),
            FakeResponse::Error(err) => Err(err.for_provider(self.name.clone()).into()),
            FakeResponse::Chat(_) => {
                let dimensions = request.dimensions.unwrap_or(PLACEHOLDER_DIMENSIONS) as usize;
                Ok(EmbeddingResponse::new(vec![
                    vec![0.0; dimensions];
                    request.input.len()
                ]))
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_embedding_model(&self) -> &str {
        "fake-embedding"
    }
}

impl fmt::Debug for FakeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("FakeProvider")
            .field("name", &self.name)
            .field("queued", &state.default.remaining())
            .field("agents", &state.agents.len())
            .field("recorded", &state.recorded.len())
            .finish()
    }
}
