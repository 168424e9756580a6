//! OpenAI-compatible chat completion client
//!
//! Talks to a `/chat/completions` endpoint in both non-streaming and
//! streaming (SSE) modes. Streaming fragments arrive on an mpsc channel in
//! generation order; the consumer drains the channel to completion and
//! reassembles the full message. Dropping the receiver abandons the stream.

use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::llm::message::ChatMessage;
use crate::metrics::LLM_CALL_TIME;

/// Error type for completion requests
#[derive(Debug)]
pub enum LlmError {
    Request(reqwest::Error),
    Parse(serde_json::Error),
    Api(String),
    EmptyResponse,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Request(e) => write!(f, "Request error: {}", e),
            LlmError::Parse(e) => write!(f, "Parse error: {}", e),
            LlmError::Api(msg) => write!(f, "API error: {}", msg),
            LlmError::EmptyResponse => write!(f, "Empty response from completion service"),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Request(e)
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        LlmError::Parse(e)
    }
}

/// The completion service seam
///
/// `complete` returns the full assistant message; `complete_stream` returns
/// a channel of non-empty text fragments in generation order. The caller is
/// responsible for concatenating the fragments and persisting the result as
/// a single assistant message.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<String>, LlmError>;
}

/// Client for an OpenAI-compatible chat completion endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.openai.com/v1")
    /// * `api_key` - Bearer token for the service
    /// * `model` - Model name sent with every request
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, stream))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl Completion for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let start = Instant::now();
        let response = self.send(messages, false).await?;
        let body: serde_json::Value = response.json().await?;

        LLM_CALL_TIME
            .with_label_values(&[&self.model])
            .observe(start.elapsed().as_secs_f64());

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(content)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<String>, LlmError> {
        let start = Instant::now();
        let response = self.send(messages, true).await?;
        let mut bytes_stream = response.bytes_stream();
        let model = self.model.clone();

        let (tx, rx) = mpsc::channel(64);

        // Producer task: parse SSE lines from the byte stream and forward the
        // delta content. Fragments within a chunk stay in generation order;
        // the channel preserves it end to end.
        tokio::spawn(async move {
            let mut buffer = String::new();

            'outer: while let Some(chunk_result) = bytes_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "completion stream interrupted");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE frames are newline-delimited; a chunk may end mid-line,
                // so only complete lines are consumed here.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        break 'outer;
                    }
                    let Ok(data) = serde_json::from_str::<serde_json::Value>(payload) else {
                        continue;
                    };
                    if let Some(fragment) = data["choices"][0]["delta"]["content"].as_str() {
                        if fragment.is_empty() {
                            continue;
                        }
                        if tx.send(fragment.to_string()).await.is_err() {
                            // Receiver dropped: the turn was abandoned.
                            break 'outer;
                        }
                    }
                }
            }

            LLM_CALL_TIME
                .with_label_values(&[&model])
                .observe(start.elapsed().as_secs_f64());
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let client = ChatClient::new("http://localhost:8080/v1", "key", "gpt-4o-mini");
        let messages = vec![ChatMessage::user("hi")];
        let body = client.request_body(&messages, true);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Api("HTTP 401: unauthorized".to_string());
        assert!(err.to_string().contains("401"));
        assert!(LlmError::EmptyResponse.to_string().contains("Empty"));
    }
}
