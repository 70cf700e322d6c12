//! Completion provider abstraction.
//!
//! [`CompletionTransport`] is the seam between the HTTP handlers and the
//! provider. [`HttpTransport`] talks to an OpenAI-compatible API; tests swap in
//! doubles that replay scripted chunk sequences.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::proxy::types::{ChatCompletionChunk, ChatCompletionResponse, Message};

pub mod http;
mod sse;

pub use http::HttpTransport;

/// Per-request model parameters sent upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Lazy, single-pass sequence of upstream chunks.
///
/// `None` is a clean end of stream. An `Err` item is terminal: nothing follows it.
/// Dropping the stream releases the upstream connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, TransportError>> + Send>>;

/// Failures talking to the completion provider.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode provider payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Something that can produce chat completions.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Single request/response completion.
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChatCompletionResponse, TransportError>;

    /// Open a streaming completion. Errors here happen before any chunk exists.
    async fn stream_complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChunkStream, TransportError>;
}
