//! Wire types shared by the proxy and its clients.
//!
//! The proxy accepts a [`ProxyRequest`] and answers with the upstream body
//! unchanged, so the response side is read as untyped JSON and the reply is
//! picked out with [`extract_reply`].

use crate::conversation::Reply;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /completions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Free-text user message. Absent counts as empty.
    #[serde(default)]
    pub message: String,
}

impl ProxyRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Read a request body without rejecting it.
    ///
    /// A body that is not JSON, or whose `message` is missing or not a
    /// string, yields an empty message.
    pub fn from_body(body: &[u8]) -> Self {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("message")?.as_str().map(str::to_string))
            .unwrap_or_default();
        Self { message }
    }
}

/// A single turn in an upstream chat-completion request or response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// Body sent to the upstream chat-completion API.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Wrap one user message with no prior context.
    pub fn single_turn(model: impl Into<String>, message: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: vec![WireMessage {
                role: "user".into(),
                content: message.into(),
            }],
            max_tokens,
        }
    }
}

/// Pull the assistant reply out of a completion response.
///
/// Reads `choices[0].message`; anything else yields `None`.
pub fn extract_reply(body: &Value) -> Option<Reply> {
    let message = body.get("choices")?.get(0)?.get("message")?;
    let message: WireMessage = serde_json::from_value(message.clone()).ok()?;
    Some(Reply::new(message.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;
    use serde_json::json;

    #[test]
    fn test_single_turn_request_shape() {
        let request = CompletionRequest::single_turn("gpt-4o", "Hello", 100);
        assert_json_snapshot!(request, @r###"
        {
          "model": "gpt-4o",
          "messages": [
            {
              "role": "user",
              "content": "Hello"
            }
          ],
          "max_tokens": 100
        }
        "###);
    }

    #[test]
    fn test_extract_reply_from_first_choice() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "Hi there" } },
                { "index": 1, "message": { "role": "assistant", "content": "ignored" } }
            ]
        });

        assert_eq!(extract_reply(&body), Some(Reply::new("Hi there")));
    }

    #[test]
    fn test_extract_reply_rejects_error_bodies() {
        assert_eq!(extract_reply(&json!({ "error": "boom" })), None);
        assert_eq!(extract_reply(&json!({ "choices": [] })), None);
        assert_eq!(
            extract_reply(&json!({ "choices": [{ "message": { "role": "assistant", "content": null } }] })),
            None
        );
    }

    #[test]
    fn test_proxy_request_parses_empty_message() {
        let request: ProxyRequest = serde_json::from_str(r#"{"message":""}"#).unwrap();
        assert_eq!(request, ProxyRequest::new(""));

        let request: ProxyRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, ProxyRequest::new(""));
    }

    #[test]
    fn test_from_body_is_lenient() {
        assert_eq!(
            ProxyRequest::from_body(br#"{"message":"Hello"}"#),
            ProxyRequest::new("Hello")
        );
        assert_eq!(ProxyRequest::from_body(br#"{"message":null}"#), ProxyRequest::new(""));
        assert_eq!(ProxyRequest::from_body(br#"{"message":42}"#), ProxyRequest::new(""));
        assert_eq!(ProxyRequest::from_body(b"not json"), ProxyRequest::new(""));
        assert_eq!(ProxyRequest::from_body(b""), ProxyRequest::new(""));
        assert_eq!(ProxyRequest::from_body(b"[1,2]"), ProxyRequest::new(""));
    }
}
