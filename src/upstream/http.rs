//! OpenAI-compatible completion transport over HTTPS.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::Serialize;

use super::sse::{decode_line, LineBuffer, SseLine};
use super::{ChunkStream, CompletionTransport, ModelParams, TransportError};
use crate::config::{ApiKey, UpstreamConfig};
use crate::proxy::types::{ChatCompletionResponse, Message};

/// Body of `POST {base_url}/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Completion transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: Option<ApiKey>,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: &str, api_key: Option<ApiKey>) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    /// Build a transport with its own client from upstream settings.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self::new(client, &config.base_url, config.api_key.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the request and fail on any non-2xx status.
    async fn send(
        &self,
        messages: &[Message],
        params: &ModelParams,
        stream: bool,
    ) -> Result<reqwest::Response, TransportError> {
        let body = CompletionRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            );
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, endpoint = %self.endpoint, "Failed to reach provider");
            TransportError::Network(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Provider returned error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChatCompletionResponse, TransportError> {
        let response = self.send(messages, params, false).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        params: &ModelParams,
    ) -> Result<ChunkStream, TransportError> {
        let response = self.send(messages, params, true).await?;
        tracing::debug!(model = %params.model, "Upstream stream opened");
        Ok(decode_chunks(response.bytes_stream()))
    }
}

/// Turn a raw streamed body into completion chunks.
///
/// Ends cleanly on `[DONE]` or when the body closes; ends after yielding the
/// first error otherwise.
pub(crate) fn decode_chunks<S>(body: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    Box::pin(stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::default();

        'read: loop {
            match body.next().await {
                Some(Ok(bytes)) => {
                    let complete = match lines.push(&bytes) {
                        Ok(complete) => complete,
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    };

                    for line in complete {
                        match decode_line(&line) {
                            Ok(SseLine::Chunk(chunk)) => {
                                yield Ok(chunk);
                            }
                            Ok(SseLine::Skip) => {}
                            Ok(SseLine::Done) => break 'read,
                            Err(e) => {
                                yield Err(e);
                                break 'read;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    yield Err(TransportError::Network(e));
                    break 'read;
                }
                None => {
                    tracing::debug!("Upstream body closed without [DONE]");
                    let trailing = std::mem::take(&mut lines).finish();
                    if let Some(line) = trailing {
                        match decode_line(&line) {
                            Ok(SseLine::Chunk(chunk)) => {
                                yield Ok(chunk);
                            }
                            Ok(SseLine::Skip) | Ok(SseLine::Done) => {}
                            Err(e) => {
                                yield Err(e);
                            }
                        }
                    }
                    break 'read;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        let parts: Vec<reqwest::Result<Bytes>> = parts
            .iter()
            .copied()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        futures::stream::iter(parts)
    }

    async fn collect(parts: &[&'static str]) -> Vec<Result<String, String>> {
        decode_chunks(body(parts))
            .map(|item| item.map(|c| c.content()).map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_decodes_until_done() {
        let out = collect(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ])
        .await;

        assert_eq!(
            out,
            vec![Ok(String::new()), Ok("Hel".to_string()), Ok("lo".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_line_ends_sequence_with_error() {
        let out = collect(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {broken\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"b\"}}]}\n",
        ])
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("a".to_string()));
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn test_body_closing_without_done_flushes_last_line() {
        let out = collect(&["data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"tail\"}}]}"]).await;
        assert_eq!(out, vec![Ok("tail".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_body_is_clean_end() {
        assert!(collect(&[]).await.is_empty());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport = HttpTransport::new(Client::new(), "https://api.example.com/v1/", None);
        assert_eq!(transport.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::user("hi")];
        let body = CompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 10,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
        assert_eq!(json["stream"], true);
    }
}
