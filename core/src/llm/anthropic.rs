//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;

use super::pricing::PriceTable;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role};

pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    prices: PriceTable,
}

impl AnthropicClient {
    pub fn from_config(config: &LlmConfig, prices: PriceTable) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::AuthFailed(format!("environment variable {} not set", config.api_key_env)))?;
        let http = Client::builder()
            .build()
            .map_err(LlmError::Network)?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            prices,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let messages: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => unreachable!("filtered above"),
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        serde_json::json!({
            "model": request.model_id,
            "max_tokens": request.max_output_tokens,
            "temperature": request.temperature,
            "system": system,
            "messages": messages,
        })
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, request: CompletionRequest, timeout: Duration) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model_id, timeout_ms = timeout.as_millis(), "anthropic: generate called");
        let body = self.build_body(&request);
        let url = format!("{}/v1/messages", self.base_url);

        let call = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send();

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(LlmError::Network(e)),
            Err(_) => return Err(LlmError::DeadlineExceeded),
        };

        let status = response.status();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if status.is_server_error() {
            return Err(LlmError::Upstream5xx {
                status: status.as_u16(),
                message: "anthropic server error".to_string(),
            });
        }
        if status == 401 || status == 403 {
            return Err(LlmError::AuthFailed("anthropic rejected credentials".to_string()));
        }
        if status.is_client_error() {
            let message = response
                .json::<AnthropicErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "bad request".to_string());
            return Err(LlmError::BadRequest(message));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(LlmError::Network)?;
        let content = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            warn!("anthropic: response had no text content");
        }

        let cost_usd = self
            .prices
            .cost_usd(&request.model_id, parsed.usage.input_tokens, parsed.usage.output_tokens);

        Ok(CompletionResponse {
            content,
            tokens_prompt: parsed.usage.input_tokens,
            tokens_completion: parsed.usage.output_tokens,
            cost_usd,
            model_id: self.model.clone(),
        })
    }

    fn provider(&self) -> &'static str {
        "anthropic"
    }
}
