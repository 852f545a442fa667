//! Per-model request-rate limiter shared across executions (§5 "LLM
//! provider quota"): a sliding window of recent call timestamps per
//! model id, the same bookkeeping shape as this codebase's scheduler
//! uses for its own rate window, scoped down to one counter per model
//! instead of one per whole service.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError};

struct ModelWindow {
    calls: VecDeque<Instant>,
}

/// Wraps an [`LlmClient`] and rejects calls with [`LlmError::RateLimited`]
/// once a model has been called `max_per_window` times within `window`,
/// instead of forwarding to the upstream provider.
pub struct RateLimitedClient {
    inner: std::sync::Arc<dyn LlmClient>,
    windows: Mutex<HashMap<String, ModelWindow>>,
    max_per_window: usize,
    window: Duration,
}

impl RateLimitedClient {
    pub fn new(inner: std::sync::Arc<dyn LlmClient>, max_per_window: usize, window: Duration) -> Self {
        Self {
            inner,
            windows: Mutex::new(HashMap::new()),
            max_per_window,
            window,
        }
    }

    /// Returns `Some(retry_after)` if `model_id` is currently over quota,
    /// otherwise records this call and returns `None`.
    fn check_and_record(&self, model_id: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let entry = windows.entry(model_id.to_string()).or_insert_with(|| ModelWindow { calls: VecDeque::new() });

        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        while entry.calls.front().is_some_and(|t| *t < cutoff) {
            entry.calls.pop_front();
        }

        if entry.calls.len() >= self.max_per_window {
            let oldest = *entry.calls.front().expect("len checked above");
            return Some(self.window.saturating_sub(now - oldest));
        }

        entry.calls.push_back(now);
        None
    }
}

#[async_trait]
impl LlmClient for RateLimitedClient {
    async fn generate(&self, request: CompletionRequest, timeout: Duration) -> Result<CompletionResponse, LlmError> {
        if let Some(retry_after) = self.check_and_record(&request.model_id) {
            debug!(model = %request.model_id, ?retry_after, "llm: rate limit exhausted for model");
            return Err(LlmError::RateLimited { retry_after });
        }
        self.inner.generate(request, timeout).await
    }

    fn provider(&self) -> &'static str {
        self.inner.provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{Message, Role};

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model_id: model.to_string(),
            messages: vec![Message { role: Role::User, content: "hi".to_string() }],
            temperature: 0.3,
            max_output_tokens: 100,
        }
    }

    fn ok() -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: "FILE: a\n```\nx\n```".to_string(),
            tokens_prompt: 1,
            tokens_completion: 1,
            cost_usd: 0.0,
            model_id: "m".to_string(),
        })
    }

    #[tokio::test]
    async fn allows_calls_within_quota() {
        let mock = std::sync::Arc::new(MockLlmClient::new(vec![ok(), ok()]));
        let limited = RateLimitedClient::new(mock, 2, Duration::from_secs(60));
        assert!(limited.generate(request("claude-sonnet-4"), Duration::from_secs(1)).await.is_ok());
        assert!(limited.generate(request("claude-sonnet-4"), Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_once_quota_exhausted() {
        let mock = std::sync::Arc::new(MockLlmClient::new(vec![ok(), ok()]));
        let limited = RateLimitedClient::new(mock, 1, Duration::from_secs(60));
        assert!(limited.generate(request("claude-sonnet-4"), Duration::from_secs(1)).await.is_ok());
        let err = limited.generate(request("claude-sonnet-4"), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn tracks_quota_independently_per_model() {
        let mock = std::sync::Arc::new(MockLlmClient::new(vec![ok(), ok()]));
        let limited = RateLimitedClient::new(mock, 1, Duration::from_secs(60));
        assert!(limited.generate(request("claude-sonnet-4"), Duration::from_secs(1)).await.is_ok());
        assert!(limited.generate(request("claude-haiku-4"), Duration::from_secs(1)).await.is_ok());
    }
}
