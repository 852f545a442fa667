//! The cancellation token + deadline context threaded through every
//! suspension point in a strategy's execution (§9 "Cancellation + deadline").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use taskstore::ExecutionId;

use crate::gatherer::TaskExecutionContext;
use crate::llm::LlmClient;
use crate::validator::Validator;

/// Cooperative cancellation signal. Cloning shares the same underlying
/// flag; callees observe cancellation at their next suspension point.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a strategy needs beyond the task itself: the deadline and
/// cancellation signal, its collaborators, and the gathered file context.
pub struct StrategyContext {
    pub execution_id: ExecutionId,
    pub deadline: Instant,
    pub cancel: CancelToken,
    pub llm: Arc<dyn LlmClient>,
    pub validator: Arc<Validator>,
    pub model_id: String,
    pub task_context: TaskExecutionContext,
}

impl StrategyContext {
    /// Time remaining until `deadline`, zero if already past.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_observed_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
