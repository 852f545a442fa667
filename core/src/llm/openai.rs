//! OpenAI-compatible Chat Completions API client.
//!
//! "OpenAI-compatible" covers OpenAI itself and any provider exposing the
//! same `/v1/chat/completions` shape (several self-hosted inference
//! gateways do), configured purely via `base-url`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::LlmConfig;

use super::pricing::PriceTable;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role};

pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    prices: PriceTable,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig, prices: PriceTable) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::AuthFailed(format!("environment variable {} not set", config.api_key_env)))?;
        let http = Client::builder().build().map_err(LlmError::Network)?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            prices,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        serde_json::json!({
            "model": request.model_id,
            "messages": messages,
            "max_tokens": request.max_output_tokens,
            "temperature": request.temperature,
        })
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn generate(&self, request: CompletionRequest, timeout: Duration) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model_id, "openai: generate called");
        let body = self.build_body(&request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let call = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(LlmError::Network(e)),
            Err(_) => return Err(LlmError::DeadlineExceeded),
        };

        let status = response.status();
        if status == 429 {
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        if status.is_server_error() {
            return Err(LlmError::Upstream5xx {
                status: status.as_u16(),
                message: "openai server error".to_string(),
            });
        }
        if status == 401 || status == 403 {
            return Err(LlmError::AuthFailed("openai rejected credentials".to_string()));
        }
        if status.is_client_error() {
            return Err(LlmError::BadRequest(format!("openai returned {status}")));
        }

        let parsed: OpenAIResponse = response.json().await.map_err(LlmError::Network)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let cost_usd = self
            .prices
            .cost_usd(&request.model_id, parsed.usage.prompt_tokens, parsed.usage.completion_tokens);

        Ok(CompletionResponse {
            content,
            tokens_prompt: parsed.usage.prompt_tokens,
            tokens_completion: parsed.usage.completion_tokens,
            cost_usd,
            model_id: self.model.clone(),
        })
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}
