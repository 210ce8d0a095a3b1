//! Ollama backend implementation.
//!
//! Talks to the native `/api/chat` endpoint with streaming disabled, so each
//! call returns the complete generated text in one response. Sampling options
//! (`temperature`, `num_ctx`) and JSON-constrained output are forwarded.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use toolpilot_core::{BackendError, BackendRequest, ReasoningBackend};
use tracing::{debug, warn};

use crate::{chat_messages, transport_error};

/// A local Ollama server.
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the `/api/chat` request body.
    fn request_body(request: &BackendRequest) -> Value {
        let mut options = json!({ "temperature": request.sampling.temperature });
        if let Some(num_ctx) = request.sampling.num_ctx {
            options["num_ctx"] = json!(num_ctx);
        }
        if let Some(max_tokens) = request.sampling.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }

        let mut body = json!({
            "model": request.model,
            "messages": chat_messages(&request.prompt),
            "stream": false,
            "options": options,
        });
        if request.sampling.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    /// Extract the generated text from a non-streaming `/api/chat` response.
    fn parse_response(body: &str) -> Result<String, BackendError> {
        let parsed: ChatResponse = serde_json::from_str(body)
            .map_err(|e| BackendError::Malformed(format!("invalid response body: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(BackendError::Malformed(error));
        }
        parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| BackendError::Malformed("response has no message".into()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ReasoningBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            model = %request.model,
            turns = request.prompt.turns.len(),
            est_tokens = request.prompt.estimated_tokens(),
            "Sending chat request to Ollama"
        );

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %text, "Ollama returned error");
            return Err(BackendError::Status {
                status_code: status.as_u16(),
                message: text,
            });
        }

        Self::parse_response(&text)
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolpilot_core::{Prompt, PromptRole, PromptTurn, SamplingParams};

    fn request(json_mode: bool) -> BackendRequest {
        BackendRequest {
            model: "qwen2.5-coder:latest".into(),
            prompt: Prompt {
                system: "protocol".into(),
                turns: vec![PromptTurn {
                    role: PromptRole::User,
                    content: "Check my email".into(),
                }],
            },
            sampling: SamplingParams {
                json_mode,
                ..SamplingParams::default()
            },
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn body_carries_options() {
        let body = OllamaBackend::request_body(&request(true));
        assert_eq!(body["model"], "qwen2.5-coder:latest");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["num_ctx"], 4096);
        assert_eq!(body["format"], "json");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Check my email");
    }

    #[test]
    fn body_without_json_mode_has_no_format() {
        let body = OllamaBackend::request_body(&request(false));
        assert!(body.get("format").is_none());
    }

    #[test]
    fn parses_message_content() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"{\"action\":\"respond\",\"text\":\"hi\"}"},"done":true}"#;
        let text = OllamaBackend::parse_response(body).unwrap();
        assert!(text.contains("respond"));
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(
            OllamaBackend::parse_response("<html>"),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(
            OllamaBackend::parse_response(r#"{"error":"model not found"}"#),
            Err(BackendError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let backend = OllamaBackend::new("http://127.0.0.1:1");
        let err = backend.complete(request(true)).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
