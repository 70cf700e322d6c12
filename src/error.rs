//! Error types for chat-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::upstream::TransportError;

/// Request-level error. Startup failures are reported by the binary instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text sent to the client. Upstream bodies stay in the logs.
    fn client_message(&self) -> String {
        match self {
            Error::Transport(TransportError::Status { status, .. }) => {
                format!("Upstream provider returned {}", status)
            }
            Error::Transport(_) => "Failed to reach upstream provider".to_string(),
            Error::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::info!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = serde_json::json!({ "error": self.client_message() });
        (status, axum::Json(body)).into_response()
    }
}
