//! HTTP surface of the relay.
//!
//! Accepts chat requests, runs moderation on the newest message and either
//! streams the provider's completion back or answers with a refusal.

mod handlers;
pub mod relay;
mod server;
pub mod types;

pub use handlers::{NDJSON_CONTENT_TYPE, TITLE_PROMPT};
pub use relay::{refusal_frames, relay_chunks, FrameStream, REFUSAL_MESSAGE};
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use types::{ChatCompletionChunk, ChatCompletionResponse, ChatRequest, Message, Role};
