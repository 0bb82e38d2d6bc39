use std::time::Duration;

use async_trait::async_trait;
use cagent_core::constants::MODEL_BACKOFF_CAP_MS;
use cagent_core::{AgentError, ChatMessage, ChatRole};
use serde::Serialize;
use serde_json::Value;

use crate::client::ChatComplete;

/// Bearer-authenticated, OpenAI-style chat-completions client with SSE
/// streaming and exponential backoff on retryable transport failures.
pub struct HttpChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl HttpChatClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries: 4,
        }
    }

    /// Returns the parsed content, or the transport error paired with a
    /// server-suggested `Retry-After` delay (seconds) when the response
    /// carried one, so the caller can honor it instead of guessing.
    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, (AgentError, Option<u64>)> {
        let body = RequestBody {
            model: &self.model,
            stream: true,
            messages: messages.iter().map(WireMessage::from).collect(),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| (AgentError::ModelTransportFailure(format!("request failed: {e}")), None))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        if status.is_client_error() && status.as_u16() != 429 {
            let text = response.text().await.unwrap_or_default();
            return Err((
                AgentError::ModelFatalFailure(format!("model API returned {status}: {text}")),
                None,
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err((
                AgentError::ModelTransportFailure(format!("model API returned {status}: {text}")),
                retry_after,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| (AgentError::ModelTransportFailure(format!("failed to read body: {e}")), None))?;
        let text = String::from_utf8_lossy(&bytes);

        consume_sse_stream(&text).map_err(|e| (e, None))
    }
}

/// Parse a numeric `Retry-After` header (seconds). The HTTP-date form is
/// not handled since no model API in practice sends it for rate limits.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl ChatComplete for HttpChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        let mut attempt = 0;
        loop {
            match self.complete_once(messages).await {
                Ok(content) => return Ok(content),
                Err((AgentError::ModelTransportFailure(msg), retry_after)) if attempt < self.max_retries => {
                    let backoff = retry_after.map(|s| s * 1000).unwrap_or_else(|| backoff_ms(attempt));
                    tracing::warn!(attempt, backoff, %msg, "retrying model request");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }
}

/// Exponential backoff capped at `MODEL_BACKOFF_CAP_MS`: 250ms * 2^attempt.
fn backoff_ms(attempt: u32) -> u64 {
    let raw = 250u64.saturating_mul(1u64 << attempt.min(16));
    raw.min(MODEL_BACKOFF_CAP_MS)
}

/// Parse an SSE byte stream of `data: {json}` lines (and a terminal
/// `data: [DONE]`), concatenating each chunk's delta content.
fn consume_sse_stream(text: &str) -> Result<String, AgentError> {
    let mut content = String::new();
    let mut saw_any = false;
    for line in text.lines() {
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload.trim() == "[DONE]" {
            break;
        }
        let chunk: Value = serde_json::from_str(payload)
            .map_err(|e| AgentError::ModelTransportFailure(format!("malformed SSE chunk: {e}")))?;
        if let Some(delta) = chunk["choices"][0]["delta"]["content"].as_str() {
            content.push_str(delta);
            saw_any = true;
        } else if let Some(full) = chunk["choices"][0]["message"]["content"].as_str() {
            content.push_str(full);
            saw_any = true;
        }
    }
    if !saw_any {
        return Err(AgentError::ModelTransportFailure(
            "no content chunks found in model response".into(),
        ));
    }
    Ok(content)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: match msg.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &msg.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_streamed_delta_chunks() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\
                       data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                       data: [DONE]\n";
        assert_eq!(consume_sse_stream(stream).unwrap(), "hello");
    }

    #[test]
    fn parses_non_streamed_full_message_fallback() {
        let stream = "data: {\"choices\":[{\"message\":{\"content\":\"hi\"}}]}\ndata: [DONE]\n";
        assert_eq!(consume_sse_stream(stream).unwrap(), "hi");
    }

    #[test]
    fn errors_on_stream_with_no_content() {
        let stream = "data: [DONE]\n";
        assert!(consume_sse_stream(stream).is_err());
    }

    #[test]
    fn backoff_is_capped() {
        assert!(backoff_ms(20) <= MODEL_BACKOFF_CAP_MS);
        assert_eq!(backoff_ms(0), 250);
    }

    #[test]
    fn retry_after_header_is_parsed_as_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_secs(&headers), Some(7));
    }

    #[test]
    fn missing_retry_after_header_is_none() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), None);
    }
}
