//! Test doubles for code built on atlas.
//!
//! [`FakeProvider`] answers chat, streaming and embeddings calls from queued
//! [`FakeResponse`]s and records what it was sent. [`AtlasFake`] is the handle
//! returned by [`Atlas::fake`](crate::Atlas::fake), with assertions over the
//! recorded traffic.

mod fake;
mod provider;
mod response;

pub use fake::AtlasFake;
pub use provider::{FakeProvider, RecordedKind, RecordedPayload, RecordedRequest};
pub use response::{FakeResponse, FakeResponseSequence, WhenEmpty};
