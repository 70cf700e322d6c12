//! Request and response types for the chat endpoints and the upstream API.

use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;
use crate::error::Error;
use crate::upstream::ModelParams;

/// Highest temperature accepted from clients.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Body accepted by `/api/chat/stream` and `/api/chat/title`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(
        default,
        alias = "maxTokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Reject requests that can never be forwarded.
    pub fn validate(&self) -> Result<(), Error> {
        if self.messages.is_empty() {
            return Err(Error::BadRequest(
                "Messages array cannot be empty".to_string(),
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=MAX_TEMPERATURE).contains(&t) {
                return Err(Error::BadRequest(format!(
                    "temperature must be between 0 and {}, got {}",
                    MAX_TEMPERATURE, t
                )));
            }
        }

        Ok(())
    }

    /// The newest message, which is the one moderation looks at.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Resolve model parameters, using `defaults` for absent or zero values.
    pub fn model_params(&self, defaults: &UpstreamConfig) -> ModelParams {
        ModelParams {
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model.as_str())
                .to_string(),
            temperature: self
                .temperature
                .filter(|t| *t > 0.0)
                .unwrap_or(defaults.temperature),
            max_tokens: self
                .max_tokens
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_tokens),
        }
    }
}

/// Non-streaming completion response, mirrored back to the client as-is.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

/// A completion choice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// Message inside a completion choice. Content may be null upstream.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: String,
    pub content: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One streaming chunk, both as decoded from upstream and as framed outbound.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A streaming choice delta.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    pub const OBJECT: &'static str = "chat.completion.chunk";

    /// Non-empty text fragments carried by this chunk, with their choice index.
    pub fn fragments(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.choices.iter().filter_map(|choice| {
            choice
                .delta
                .content
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| (choice.index, c))
        })
    }

    /// A single-fragment chunk sharing this chunk's id, model and timestamp.
    pub fn reframe(&self, index: u32, content: String) -> Self {
        Self {
            id: self.id.clone(),
            object: Self::OBJECT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index,
                delta: Delta {
                    role: None,
                    content: Some(content),
                },
                finish_reason: None,
            }],
        }
    }

    /// A standalone chunk carrying `content`, for text that never came from upstream.
    pub fn synthetic(model: &str, content: impl Into<String>) -> Self {
        let header = Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp().max(0) as u64,
            model: model.to_string(),
            ..Default::default()
        };
        header.reframe(0, content.into())
    }

    /// Concatenated fragments, in choice order.
    pub fn content(&self) -> String {
        self.fragments().map(|(_, c)| c).collect()
    }
}
