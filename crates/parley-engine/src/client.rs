//! HTTP client for the proxy's `/completions` endpoint.

use crate::completion::{extract_reply, ProxyRequest};
use crate::config::ClientConfig;
use crate::conversation::{Reply, ReplySource};
use crate::proxy::COMPLETIONS_PATH;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Sends drafts to the proxy and extracts the assistant reply.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    endpoint: String,
}

impl ProxyClient {
    /// Create a client for the proxy at `config.proxy_url`.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!(
                "{}{COMPLETIONS_PATH}",
                config.proxy_url.trim_end_matches('/')
            ),
        }
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one message and return the assistant reply.
    pub async fn send(&self, message: &str) -> Result<Reply, ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ProxyRequest::new(message))
            .send()
            .await
            .map_err(ClientError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(ClientError::Request)?;
        extract_reply(&body).ok_or_else(|| ClientError::Malformed(body.to_string()))
    }
}

#[async_trait]
impl ReplySource for ProxyClient {
    async fn request_reply(&self, message: &str) -> Result<Reply, ClientError> {
        self.send(message).await
    }
}

/// Errors calling the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or unreadable body.
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Proxy answered with a non-2xx status.
    #[error("Proxy returned status {0}")]
    Status(u16),

    /// Response had no `choices[0].message`.
    #[error("Malformed response: {0}")]
    Malformed(String),
}
