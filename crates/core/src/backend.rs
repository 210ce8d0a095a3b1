//! Reasoning backend trait — the abstraction over the inference endpoint.
//!
//! A backend takes an already-encoded prompt and returns the model's raw
//! text, unmodified. It performs no retries and no parsing; both belong to
//! the loop controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BackendError;

/// Which side of the conversation a prompt turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Assistant,
}

/// One rendered turn of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub content: String,
}

/// The complete payload sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Instruction block: protocol, tools, budget
    pub system: String,

    /// Transcript rendered as strictly alternating turns, starting with `User`
    pub turns: Vec<PromptTurn>,
}

impl Prompt {
    /// Rough size estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        (self.system.len() + self.turns.iter().map(|t| t.content.len()).sum::<usize>()) / 4
    }
}

/// Sampling parameters forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// 0.0 keeps structured output stable
    #[serde(default)]
    pub temperature: f32,

    /// Context window size, for backends that accept one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the backend to constrain output to JSON, when supported
    #[serde(default)]
    pub json_mode: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            num_ctx: Some(4096),
            max_tokens: None,
            json_mode: false,
        }
    }
}

/// A request to the reasoning backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model: String,
    pub prompt: Prompt,
    pub sampling: SamplingParams,
    pub timeout: Duration,
}

/// The core ReasoningBackend trait.
///
/// Implementations: Ollama, OpenAI-compatible endpoints, scripted mocks.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send the prompt and return the raw generated text.
    async fn complete(&self, request: BackendRequest) -> std::result::Result<String, BackendError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}
