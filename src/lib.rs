//! chat-relay - moderated streaming relay for OpenAI-compatible chat completions
//!
//! This library provides the core functionality for the relay server:
//! configuration, the lexical moderation gate, the upstream completion
//! transport and the stream relay that republishes chunks to clients.

pub mod config;
pub mod error;
pub mod moderation;
pub mod proxy;
pub mod upstream;

pub use config::Config;
pub use error::Error;
