//! parley-engine: Headless engine for the parley chat relay
//!
//! This crate provides everything except the terminal front end:
//! - Conversation state and thread grouping
//! - The `/completions` proxy server
//! - HTTP clients for the upstream API and for the proxy
//! - Configuration

pub mod client;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod proxy;
pub mod upstream;

// Re-export commonly used types
pub use client::{ClientError, ProxyClient};
pub use completion::{extract_reply, CompletionRequest, ProxyRequest, WireMessage};
pub use config::{ClientConfig, ConfigError, ProxyConfig, API_KEY_ENV};
pub use conversation::{
    ConversationStore, ConversationView, Message, PendingTurn, Reply, ReplySource, Role,
    SubmitError, ThreadTitle,
};
pub use proxy::{router, serve, ProxyError, ProxyState, ServeError, GENERIC_ERROR};
pub use upstream::{HttpUpstream, Upstream, UpstreamError};

/// Returns the engine version.
pub fn engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
