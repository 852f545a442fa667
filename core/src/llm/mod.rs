//! LLM Adapter (L3): uniform request/response over one or more providers.

mod anthropic;
pub(crate) mod client;
mod error;
mod openai;
pub mod pricing;
mod rate_limiter;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use pricing::PriceTable;
pub use rate_limiter::RateLimitedClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role};

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::LlmConfig;

/// Construct the configured provider's client, wrapped in the shared
/// per-model rate limiter. Only one provider is active per deployment;
/// which one is chosen by `config.provider`.
pub fn create_client(config: &LlmConfig, prices: PriceTable) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "llm: create_client called");
    let provider: Arc<dyn LlmClient> = match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicClient::from_config(config, prices)?),
        "openai" => Arc::new(OpenAIClient::from_config(config, prices)?),
        other => {
            return Err(LlmError::Unknown(format!(
                "unknown LLM provider '{other}', supported: anthropic, openai"
            )));
        }
    };
    Ok(Arc::new(RateLimitedClient::new(
        provider,
        config.rate_limit_per_window,
        Duration::from_secs(config.rate_limit_window_sec),
    )))
}
