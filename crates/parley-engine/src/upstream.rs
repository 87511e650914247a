//! Client for the remote chat-completion API.

use crate::completion::CompletionRequest;
use crate::config::ProxyConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// The remote completion API as seen by the proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward one user message and return the raw JSON response body.
    async fn complete(&self, message: &str) -> Result<Value, UpstreamError>;
}

/// HTTP implementation of [`Upstream`] with a fixed model and output length.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpUpstream {
    /// Build an upstream client from proxy configuration and a credential.
    pub fn new(config: &ProxyConfig, api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(UpstreamError::Request)?;

        Ok(Self {
            client,
            url: config.upstream_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn complete(&self, message: &str) -> Result<Value, UpstreamError> {
        let request = CompletionRequest::single_turn(&self.model, message, self.max_tokens);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(UpstreamError::Request)?;
        serde_json::from_slice(&body).map_err(UpstreamError::Malformed)
    }
}

/// Errors talking to the upstream API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport failure (connect, timeout, TLS).
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Upstream answered with a non-2xx status.
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream body was not JSON.
    #[error("Malformed upstream response: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config_for(base: &str) -> ProxyConfig {
        ProxyConfig {
            upstream_url: format!("{base}/v1/chat/completions"),
            timeout_seconds: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_forwards_fixed_model_and_credential() {
        let seen: Arc<Mutex<Option<(String, Value)>>> = Arc::default();
        let seen_in_handler = seen.clone();

        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *seen.lock().unwrap() = Some((auth, body));
                    Json(json!({
                        "choices": [{ "message": { "role": "assistant", "content": "Hi there" } }]
                    }))
                }
            }),
        );
        let base = spawn_server(router).await;

        let upstream = HttpUpstream::new(&config_for(&base), "sk-test").unwrap();
        let body = upstream.complete("Hello").await.unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "Hi there");

        let (auth, sent) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(
            sent,
            json!({
                "model": "gpt-4o",
                "messages": [{ "role": "user", "content": "Hello" }],
                "max_tokens": 100
            })
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "Incorrect API key" } })),
                )
            }),
        );
        let base = spawn_server(router).await;

        let upstream = HttpUpstream::new(&config_for(&base), "bad-key").unwrap();
        let err = upstream.complete("").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let router = Router::new().route("/v1/chat/completions", post(|| async { "not json" }));
        let base = spawn_server(router).await;

        let upstream = HttpUpstream::new(&config_for(&base), "sk-test").unwrap();
        let err = upstream.complete("Hello").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = HttpUpstream::new(&config_for(&format!("http://{addr}")), "sk-test").unwrap();
        let err = upstream.complete("Hello").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Request(_)));
    }
}
