//! LLM request/response types.
//!
//! Deliberately provider-agnostic: both the Anthropic and OpenAI-compatible
//! clients translate to/from this shape so strategies never see wire
//! formats.

use serde::{Deserialize, Serialize};

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One LLM call: `{ model-id, messages, temperature, max-output-tokens }`.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Response: `{ content, tokens-prompt, tokens-completion, cost-usd, model-id }`.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    pub cost_usd: f64,
    pub model_id: String,
}

impl CompletionResponse {
    pub fn tokens_used(&self) -> u64 {
        self.tokens_prompt + self.tokens_completion
    }
}
