//! Content moderation: the stemmed lexical filter and the gate built on it.

pub mod filter;
pub mod gate;

pub use filter::{normalize, BannedStemSet, FilterError};
pub use gate::{ModerationGate, ModerationVerdict, DEFAULT_MAX_MESSAGE_CHARS};
