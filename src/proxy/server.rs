//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::Config;
use crate::moderation::{BannedStemSet, ModerationGate};
use crate::upstream::{CompletionTransport, HttpTransport};

/// Response header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state. Everything in here is read-only.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn CompletionTransport>,
    pub gate: Arc<ModerationGate>,
    pub config: Arc<Config>,
    /// Cancelled on process shutdown; each relay holds a child token.
    pub shutdown: CancellationToken,
}

/// Correlation id assigned to every inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let chat = Router::new()
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/chat/title", post(handlers::chat_title));

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .nest("/api", chat)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// CORS for browser clients. An empty origin list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    cors.expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}

/// Run the HTTP server until Ctrl-C or SIGTERM.
pub async fn run_server(
    config: Config,
    banned: BannedStemSet,
    listen_addr: String,
) -> anyhow::Result<()> {
    let transport = HttpTransport::from_config(&config.upstream)?;
    let gate = ModerationGate::new(Arc::new(banned), config.moderation.max_message_chars);
    let shutdown = CancellationToken::new();

    tracing::info!(
        endpoint = %transport.endpoint(),
        model = %config.upstream.model,
        flush_policy = ?config.stream.flush_policy,
        "Upstream configured"
    );

    let state = AppState {
        transport: Arc::new(transport),
        gate: Arc::new(gate),
        config: Arc::new(config),
        shutdown: shutdown.clone(),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting chat-relay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for a termination signal, then cancel every in-flight relay.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested, closing open streams");
    token.cancel();
}
