//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::relay::{refusal_frames, relay_chunks, FrameStream};
use super::server::{AppState, RequestId};
use super::types::{ChatCompletionResponse, ChatRequest, Message};
use crate::error::Error;

/// Prompt prepended to the message a title is generated from.
pub const TITLE_PROMPT: &str = "Summarize the input as title of no more than 5 words. Output only the summarized title. The input is: ";

/// Content type of the streaming endpoint: one JSON chunk per line.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

fn parse_request(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, Error> {
    let Json(request) =
        payload.map_err(|e| Error::BadRequest(format!("Invalid request: {}", e.body_text())))?;
    request.validate()?;
    Ok(request)
}

fn last_message(request: &ChatRequest) -> Result<&Message, Error> {
    request
        .last_message()
        .ok_or_else(|| Error::BadRequest("Messages array cannot be empty".to_string()))
}

/// Headers are committed as soon as this is returned; frames follow as they are produced.
fn stream_response(frames: FrameStream) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Handle POST /api/chat/stream
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let request = parse_request(payload)?;
    let last = last_message(&request)?;
    let params = request.model_params(&state.config.upstream);

    tracing::info!(
        request_id = %request_id.0,
        model = %params.model,
        messages = request.messages.len(),
        "Received chat stream request"
    );

    let verdict = state.gate.evaluate(&last.content);
    if !verdict.accepted {
        tracing::info!(
            request_id = %request_id.0,
            reason = ?verdict.reason,
            "Message rejected by moderation, sending refusal"
        );
        return Ok(stream_response(refusal_frames(&params.model)));
    }

    let upstream = state
        .transport
        .stream_complete(&request.messages, &params)
        .await?;

    let frames = relay_chunks(
        upstream,
        state.config.stream.flush_policy,
        state.shutdown.child_token(),
    );

    Ok(stream_response(frames))
}

/// Handle POST /api/chat/title
pub async fn chat_title(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatCompletionResponse>, Error> {
    let request = parse_request(payload)?;
    let last = last_message(&request)?;

    if last.content.trim().is_empty() {
        return Err(Error::BadRequest("No message content provided".to_string()));
    }

    let verdict = state.gate.evaluate(&last.content);
    if !verdict.accepted {
        let reason = verdict
            .reason
            .unwrap_or_else(|| "message rejected".to_string());
        return Err(Error::BadRequest(reason));
    }

    let params = request.model_params(&state.config.upstream);
    let messages = vec![Message::new(
        last.role,
        format!("{}{}", TITLE_PROMPT, last.content),
    )];

    tracing::info!(
        request_id = %request_id.0,
        model = %params.model,
        "Received title request"
    );

    let response = state.transport.complete(&messages, &params).await?;

    tracing::info!(
        request_id = %request_id.0,
        title = ?response.first_content(),
        "Title generated"
    );

    Ok(Json(response))
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay"
    }))
}
