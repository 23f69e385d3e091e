//! Provider-specific payload extraction.
//!
//! Stateless parsers over the raw proxied bytes. Unknown providers yield
//! `Ok(None)`; malformed bytes for a known provider are a parse error the
//! caller decides how to handle.

use serde::Deserialize;

use crate::error::AppError;

/// Model and prompt text pulled from an outbound request body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub model: String,
    /// All message contents in document order, newline-separated, for token
    /// estimation when the response omits usage.
    pub message_text: String,
}

/// Usage counts pulled from an upstream response body, verbatim as reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub model: String,
}

/// Parse model and message text from a request body for the given provider.
pub fn extract_request_info(body: &[u8], provider: &str) -> Result<Option<RequestInfo>, AppError> {
    match provider {
        "openai" => {
            let req: OpenAiRequest = serde_json::from_slice(body)?;
            let text = req
                .messages
                .iter()
                .map(|m| m.content.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Some(RequestInfo {
                model: req.model,
                message_text: text,
            }))
        }
        "anthropic" => {
            let req: AnthropicRequest = serde_json::from_slice(body)?;
            let mut parts = Vec::new();
            if let Some(system) = req.system {
                parts.push(system.as_text());
            }
            for m in &req.messages {
                parts.push(m.content.as_text());
            }
            Ok(Some(RequestInfo {
                model: req.model,
                message_text: parts.join("\n"),
            }))
        }
        _ => Ok(None),
    }
}

/// Parse the usage block from a response body for the given provider.
/// A response without a usage block yields `Ok(None)`.
pub fn extract_response_usage(
    body: &[u8],
    provider: &str,
) -> Result<Option<ResponseUsage>, AppError> {
    match provider {
        "openai" => {
            let resp: OpenAiResponse = serde_json::from_slice(body)?;
            Ok(resp.usage.map(|u| ResponseUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                model: resp.model.unwrap_or_default(),
            }))
        }
        "anthropic" => {
            let resp: AnthropicResponse = serde_json::from_slice(body)?;
            Ok(resp.usage.map(|u| ResponseUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                model: resp.model.unwrap_or_default(),
            }))
        }
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// OpenAI wire schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenAiRequest {
    model: String,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: Option<String>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

// ---------------------------------------------------------------------------
// Anthropic wire schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AnthropicRequest {
    model: String,
    system: Option<Content>,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}

// ---------------------------------------------------------------------------
// Shared message shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Content,
}

/// Message content is either a plain string or an array of typed blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_request() {
        let body = br#"{
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        }"#;
        let info = extract_request_info(body, "openai").unwrap().unwrap();
        assert_eq!(info.model, "gpt-4o");
        assert_eq!(info.message_text, "be brief\nhello");
    }

    #[test]
    fn test_openai_response_usage() {
        let body = br#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        }"#;
        let usage = extract_response_usage(body, "openai").unwrap().unwrap();
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 40);
        assert_eq!(usage.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_openai_response_without_usage() {
        let body = br#"{"model": "gpt-4o", "choices": []}"#;
        assert!(extract_response_usage(body, "openai").unwrap().is_none());
    }

    #[test]
    fn test_anthropic_request_with_system() {
        let body = br#"{
            "model": "claude-3-5-sonnet-20241022",
            "system": "you are terse",
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let info = extract_request_info(body, "anthropic").unwrap().unwrap();
        assert_eq!(info.message_text, "you are terse\nhi");
    }

    #[test]
    fn test_anthropic_block_content() {
        let body = br#"{
            "model": "claude-3-5-sonnet-20241022",
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "text", "text": "part two"}
                ]}
            ]
        }"#;
        let info = extract_request_info(body, "anthropic").unwrap().unwrap();
        assert_eq!(info.message_text, "part one\npart two");
    }

    #[test]
    fn test_anthropic_response_usage() {
        let body = br#"{
            "model": "claude-3-5-sonnet-20241022",
            "content": [],
            "usage": {"input_tokens": 15, "output_tokens": 7}
        }"#;
        let usage = extract_response_usage(body, "anthropic").unwrap().unwrap();
        assert_eq!(usage.input_tokens, 15);
        assert_eq!(usage.output_tokens, 7);
    }

    #[test]
    fn test_unknown_provider_is_absent_not_error() {
        let body = b"definitely not json";
        assert!(extract_request_info(body, "mistral").unwrap().is_none());
        assert!(extract_response_usage(body, "").unwrap().is_none());
    }

    #[test]
    fn test_malformed_known_provider_is_error() {
        assert!(extract_request_info(b"{not json", "openai").is_err());
        assert!(extract_response_usage(b"{not json", "anthropic").is_err());
    }
}
