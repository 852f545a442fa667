//! `LlmClient` trait definition.

use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Uniform request/response contract over an LLM provider.
///
/// Each call is independent: no conversation state is carried between
/// invocations, since every strategy builds its own prompt from the task
/// and accumulated context/errors.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue one completion request, bounded by `timeout`. A timeout or
    /// cancellation must surface as [`LlmError::DeadlineExceeded`], never a
    /// panic or a hang.
    async fn generate(&self, request: CompletionRequest, timeout: Duration) -> Result<CompletionResponse, LlmError>;

    /// The provider name, for logging and error attribution.
    fn provider(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records requests and replays a fixed sequence of responses/errors,
    /// used by strategy and executor tests.
    pub struct MockLlmClient {
        responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn generate(&self, _request: CompletionRequest, _timeout: Duration) -> Result<CompletionResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Unknown("mock exhausted".to_string()));
            }
            responses.remove(0)
        }

        fn provider(&self) -> &'static str {
            "mock"
        }
    }
}
