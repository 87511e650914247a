//! Configuration types for the parley proxy and client.
//!
//! The proxy settings can come from a JSON file; the upstream credential only
//! ever comes from the environment.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable holding the upstream API credential.
pub const API_KEY_ENV: &str = "API_KEY";

/// Proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Chat-completion endpoint of the upstream API.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum output length sent with every request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout in seconds for the upstream call.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3001".into()
}

fn default_upstream_url() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_max_tokens() -> u32 {
    100
}

fn default_timeout() -> u64 {
    60
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_url: default_upstream_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        std::fs::write(path, content).map_err(ConfigError::Io)
    }

    /// Parse the listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(self.listen_addr.clone()))
    }

    /// Read the upstream credential from [`API_KEY_ENV`].
    pub fn api_key_from_env() -> Result<String, ConfigError> {
        api_key_from(std::env::var(API_KEY_ENV).ok())
    }
}

/// Validate a credential value, treating blank as missing.
fn api_key_from(value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingApiKey),
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the proxy.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:3001".into()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
        }
    }
}

/// Errors that can occur when working with configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading or writing config.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing config JSON.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// Error serializing config to JSON.
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The upstream credential is not set.
    #[error("API_KEY is not set")]
    MissingApiKey,

    /// The listen address does not parse.
    #[error("Invalid listen address: {0}")]
    InvalidAddr(String),
}
