//! OpenAI-compatible backend implementation.
//!
//! Works with any endpoint exposing `/chat/completions`: llama.cpp server,
//! vLLM, LM Studio, or Ollama's own `/v1` compatibility layer.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use toolpilot_core::{BackendError, BackendRequest, ReasoningBackend};
use tracing::{debug, warn};

use crate::{chat_messages, transport_error};

/// An OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(request: &BackendRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": chat_messages(&request.prompt),
            "temperature": request.sampling.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.sampling.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.sampling.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    fn parse_response(body: &str) -> Result<String, BackendError> {
        let parsed: ApiResponse = serde_json::from_str(body)
            .map_err(|e| BackendError::Malformed(format!("Failed to parse response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| BackendError::Malformed("No choices in response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let mut builder = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %text, "Backend returned error");
            return Err(BackendError::Status {
                status_code: status.as_u16(),
                message: text,
            });
        }

        Self::parse_response(&text)
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.client.get(&url);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = builder.send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolpilot_core::{Prompt, SamplingParams};

    fn request() -> BackendRequest {
        BackendRequest {
            model: "local-model".into(),
            prompt: Prompt {
                system: "protocol".into(),
                turns: vec![],
            },
            sampling: SamplingParams {
                json_mode: true,
                max_tokens: Some(256),
                ..SamplingParams::default()
            },
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn body_shape() {
        let body = OpenAiCompatBackend::request_body(&request());
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn takes_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(OpenAiCompatBackend::parse_response(body).unwrap(), "hello");
    }

    #[test]
    fn empty_choices_is_malformed() {
        assert!(matches!(
            OpenAiCompatBackend::parse_response(r#"{"choices":[]}"#),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let backend = OpenAiCompatBackend::new("local", "http://localhost:8080/v1/", "");
        assert_eq!(backend.base_url, "http://localhost:8080/v1");
    }
}
