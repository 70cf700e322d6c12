//! Shared helpers for integration tests: a scripted completion transport and
//! app builders that wire it into the real router.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use futures::StreamExt;
use http::Request;
use tokio_util::sync::CancellationToken;

use chat_relay::config::{Config, FlushPolicy};
use chat_relay::moderation::{BannedStemSet, ModerationGate};
use chat_relay::proxy::{create_router, AppState, ChatCompletionChunk, ChatCompletionResponse, Message};
use chat_relay::upstream::{ChunkStream, CompletionTransport, ModelParams, TransportError};

/// Transport double that replays fixed fragments and records what it was asked.
#[derive(Default)]
pub struct ScriptedTransport {
    fragments: Vec<String>,
    fail_status: Option<u16>,
    completion: ChatCompletionResponse,
    stream_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    seen_messages: Mutex<Vec<Message>>,
    seen_params: Mutex<Option<ModelParams>>,
}

impl ScriptedTransport {
    pub fn streaming(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            fail_status: Some(status),
            ..Default::default()
        })
    }

    pub fn completing(content: &str) -> Arc<Self> {
        let completion: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-title",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }))
        .unwrap();

        Arc::new(Self {
            completion,
            ..Default::default()
        })
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn seen_messages(&self) -> Vec<Message> {
        self.seen_messages.lock().unwrap().clone()
    }

    pub fn seen_params(&self) -> Option<ModelParams> {
        self.seen_params.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message], params: &ModelParams) {
        *self.seen_messages.lock().unwrap() = messages.to_vec();
        *self.seen_params.lock().unwrap() = Some(params.clone());
    }

    fn failure(&self) -> Option<TransportError> {
        self.fail_status.map(|status| TransportError::Status {
            status,
            body: "{\"error\":{\"message\":\"scripted failure\"}}".to_string(),
        })
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChatCompletionResponse, TransportError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages, params);
        match self.failure() {
            Some(e) => Err(e),
            None => Ok(self.completion.clone()),
        }
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChunkStream, TransportError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages, params);
        if let Some(e) = self.failure() {
            return Err(e);
        }

        let model = params.model.clone();
        let chunks: Vec<Result<ChatCompletionChunk, TransportError>> = self
            .fragments
            .iter()
            .map(|text| Ok(ChatCompletionChunk::synthetic(&model, text.clone())))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Build the real router around `transport` with the given banned words.
pub fn app(transport: Arc<dyn CompletionTransport>, banned: &[&str]) -> axum::Router {
    app_with_config(transport, banned, Config::default())
}

pub fn app_with_policy(
    transport: Arc<dyn CompletionTransport>,
    banned: &[&str],
    policy: FlushPolicy,
) -> axum::Router {
    let mut config = Config::default();
    config.stream.flush_policy = policy;
    app_with_config(transport, banned, config)
}

pub fn app_with_config(
    transport: Arc<dyn CompletionTransport>,
    banned: &[&str],
    config: Config,
) -> axum::Router {
    let gate = ModerationGate::new(
        Arc::new(BannedStemSet::from_words(banned)),
        config.moderation.max_message_chars,
    );

    create_router(AppState {
        transport,
        gate: Arc::new(gate),
        config: Arc::new(config),
        shutdown: CancellationToken::new(),
    })
}

/// POST a JSON body to `uri`.
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Collect the body as separate data frames, exactly as the relay produced them.
pub async fn body_frames(response: axum::response::Response) -> Vec<bytes::Bytes> {
    response
        .into_body()
        .into_data_stream()
        .map(|frame| frame.expect("body frame"))
        .collect()
        .await
}

/// Decode each frame as one outbound chunk and return its text.
pub fn frame_texts(frames: &[bytes::Bytes]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            assert!(frame.ends_with(b"\n"), "frame must end with a newline");
            let chunk: ChatCompletionChunk = serde_json::from_slice(frame).expect("frame is a JSON chunk");
            chunk.content()
        })
        .collect()
}

/// Parse the response body as JSON and return (status_code, json_value).
pub async fn parse_body(response: axum::response::Response) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}
