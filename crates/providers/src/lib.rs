//! Reasoning backend implementations for ToolPilot.
//!
//! All backends implement the `toolpilot_core::ReasoningBackend` trait.
//! [`build_from_config`] selects one based on `[backend]` configuration.

pub mod ollama;
pub mod openai_compat;

pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;

use serde::Serialize;
use std::sync::Arc;
use toolpilot_core::{BackendError, Prompt, PromptRole, ReasoningBackend};

/// A chat message in the wire shape shared by Ollama and OpenAI-style APIs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Flatten a prompt into a system message followed by the rendered turns.
pub(crate) fn chat_messages(prompt: &Prompt) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
    if !prompt.system.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: prompt.system.clone(),
        });
    }
    messages.extend(prompt.turns.iter().map(|t| ChatMessage {
        role: match t.role {
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        },
        content: t.content.clone(),
    }));
    messages
}

/// Classify a transport error. Everything reqwest reports before a status
/// line arrives is treated as the endpoint being unavailable.
pub(crate) fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Unavailable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        BackendError::Unavailable(format!("connection failed: {err}"))
    } else {
        BackendError::Unavailable(err.to_string())
    }
}

/// Build the configured backend.
pub fn build_from_config(
    config: &toolpilot_config::AppConfig,
) -> Result<Arc<dyn ReasoningBackend>, BackendError> {
    let backend = &config.backend;
    match backend.kind.as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::new(&backend.url))),
        "openai_compat" => Ok(Arc::new(OpenAiCompatBackend::new(
            "openai_compat",
            &backend.url,
            backend.api_key.clone().unwrap_or_default(),
        ))),
        other => Err(BackendError::NotConfigured(format!(
            "unknown backend kind '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolpilot_core::PromptTurn;

    #[test]
    fn system_goes_first() {
        let prompt = Prompt {
            system: "rules".into(),
            turns: vec![
                PromptTurn {
                    role: PromptRole::User,
                    content: "hi".into(),
                },
                PromptTurn {
                    role: PromptRole::Assistant,
                    content: "{}".into(),
                },
            ],
        };
        let messages = chat_messages(&prompt);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn builds_configured_backend() {
        let mut config = toolpilot_config::AppConfig::default();
        assert_eq!(build_from_config(&config).unwrap().name(), "ollama");

        config.backend.kind = "openai_compat".into();
        config.backend.url = "http://localhost:8080/v1".into();
        assert_eq!(build_from_config(&config).unwrap().name(), "openai_compat");
    }
}
