//! Upstream-to-client stream relay.
//!
//! Each upstream text fragment is re-framed as one JSON line (`\n`-terminated,
//! no `data:` prefix) and handed to the response body before the next upstream
//! chunk is pulled. The relay ends on upstream end, upstream error or
//! cancellation; ending it drops the upstream stream and its connection.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::pin::Pin;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::types::ChatCompletionChunk;
use crate::config::FlushPolicy;
use crate::upstream::{ChunkStream, TransportError};

/// Fixed reply sent instead of a completion when moderation rejects a message.
pub const REFUSAL_MESSAGE: &str = "I apologize, but I cannot process messages with inappropriate content. Please rephrase your message appropriately.";

/// Outbound body: one serialized chunk per item.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Serialize one chunk as a newline-terminated JSON line.
pub fn encode_frame(chunk: &ChatCompletionChunk) -> Option<Bytes> {
    match serde_json::to_vec(chunk) {
        Ok(mut line) => {
            line.push(b'\n');
            Some(Bytes::from(line))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode stream frame, skipping");
            None
        }
    }
}

/// The single frame sent on a moderation rejection.
pub fn refusal_frames(model: &str) -> FrameStream {
    let frame = encode_frame(&ChatCompletionChunk::synthetic(model, REFUSAL_MESSAGE));
    Box::pin(futures::stream::iter(frame.map(Ok::<_, Infallible>)))
}

fn is_boundary(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Per-choice text held back until a sentence boundary.
#[derive(Debug, Default)]
struct SentenceBuffer {
    pending: BTreeMap<u32, String>,
}

impl SentenceBuffer {
    /// Add a fragment; returns the text up to and including the last boundary, if any.
    fn push(&mut self, index: u32, fragment: &str) -> Option<String> {
        let buffered = self.pending.entry(index).or_default();
        buffered.push_str(fragment);

        // boundary chars are all one byte wide
        let cut = buffered.rfind(is_boundary)? + 1;
        let rest = buffered.split_off(cut);
        Some(std::mem::replace(buffered, rest))
    }

    /// Everything still held, in choice order.
    fn drain(&mut self) -> Vec<(u32, String)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|(_, text)| !text.is_empty())
            .collect()
    }
}

enum Pulled {
    Cancelled,
    Next(Option<Result<ChatCompletionChunk, TransportError>>),
}

/// Relay `upstream` as outbound frames under `policy` until it ends or `cancel` fires.
pub fn relay_chunks(
    upstream: ChunkStream,
    policy: FlushPolicy,
    cancel: CancellationToken,
) -> FrameStream {
    Box::pin(stream! {
        let mut upstream = upstream;
        let mut sentences = SentenceBuffer::default();
        let mut header = ChatCompletionChunk::default();
        let mut frames: usize = 0;

        loop {
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => Pulled::Cancelled,
                next = upstream.next() => Pulled::Next(next),
            };

            let chunk = match pulled {
                Pulled::Cancelled => {
                    tracing::debug!(frames, "Relay cancelled, closing upstream");
                    break;
                }
                Pulled::Next(Some(Ok(chunk))) => chunk,
                Pulled::Next(end) => {
                    if let Some(Err(e)) = end {
                        tracing::warn!(error = %e, frames, "Upstream stream failed mid-response");
                    }
                    for (index, text) in sentences.drain() {
                        if let Some(frame) = encode_frame(&header.reframe(index, text)) {
                            frames += 1;
                            yield Ok::<_, Infallible>(frame);
                        }
                    }
                    break;
                }
            };

            let ready: Vec<(u32, String)> = match policy {
                FlushPolicy::Eager => chunk
                    .fragments()
                    .map(|(index, text)| (index, text.to_string()))
                    .collect(),
                FlushPolicy::Sentence => chunk
                    .fragments()
                    .filter_map(|(index, text)| sentences.push(index, text).map(|t| (index, t)))
                    .collect(),
            };

            for (index, text) in ready {
                if let Some(frame) = encode_frame(&chunk.reframe(index, text)) {
                    frames += 1;
                    yield Ok::<_, Infallible>(frame);
                }
            }
            header = chunk;
        }

        tracing::debug!(frames, "Relay finished");
    })
}
