//! The same-origin proxy: one endpoint that relays a message upstream.

use crate::completion::ProxyRequest;
use crate::config::{ConfigError, ProxyConfig};
use crate::upstream::{HttpUpstream, Upstream, UpstreamError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Completion relay endpoint path.
pub const COMPLETIONS_PATH: &str = "/completions";
/// Health endpoint path.
pub const HEALTH_PATH: &str = "/health";

/// Message returned to callers for every upstream failure.
pub const GENERIC_ERROR: &str = "Internal server error";

/// Shared state for proxy handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<dyn Upstream>,
}

impl ProxyState {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }
}

/// Errors surfaced over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Anything that went wrong reaching the upstream API.
    #[error("upstream failure: {0}")]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": GENERIC_ERROR }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Build the proxy router with permissive CORS.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(COMPLETIONS_PATH, post(completions))
        .route(HEALTH_PATH, get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

// No content-type or shape check: only the upstream call can fail.
async fn completions(
    State(st): State<ProxyState>,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    let request = ProxyRequest::from_body(&body);
    tracing::debug!(len = request.message.len(), "relaying message");
    match st.upstream.complete(&request.message).await {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            tracing::warn!(error = %e, "upstream call failed");
            Err(e.into())
        }
    }
}

/// Errors starting the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Bad or missing configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The upstream client could not be built.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the proxy until `shutdown` resolves.
///
/// The credential is checked before binding, so a missing key fails fast.
pub async fn serve<F>(config: &ProxyConfig, api_key: &str, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.socket_addr()?;
    let upstream = HttpUpstream::new(config, api_key)?;
    let app = router(ProxyState::new(Arc::new(upstream)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        model = %config.model,
        max_tokens = config.max_tokens,
        "proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("proxy stopped");
    Ok(())
}
