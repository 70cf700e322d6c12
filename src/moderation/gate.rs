//! Admission check applied to the newest message before anything goes upstream.

use std::sync::Arc;

use super::filter::BannedStemSet;

/// Default upper bound on a message, in characters after trimming.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1000;

pub const REASON_TOO_LONG: &str = "message exceeds maximum length";
pub const REASON_INAPPROPRIATE: &str = "message contains inappropriate content";

/// Outcome of evaluating one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl ModerationVerdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Length and lexical checks over a single message.
#[derive(Debug, Clone)]
pub struct ModerationGate {
    banned: Arc<BannedStemSet>,
    max_message_chars: usize,
}

impl ModerationGate {
    pub fn new(banned: Arc<BannedStemSet>, max_message_chars: usize) -> Self {
        Self {
            banned,
            max_message_chars,
        }
    }

    /// Evaluate `text`. The length check runs first and short-circuits.
    pub fn evaluate(&self, text: &str) -> ModerationVerdict {
        let length = text.trim().chars().count();
        if length > self.max_message_chars {
            tracing::debug!(length, max = self.max_message_chars, "Message rejected by length check");
            return ModerationVerdict::reject(REASON_TOO_LONG);
        }

        if self.banned.contains_banned(text) {
            tracing::debug!("Message rejected by lexical filter");
            return ModerationVerdict::reject(REASON_INAPPROPRIATE);
        }

        ModerationVerdict::accept()
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }
}
