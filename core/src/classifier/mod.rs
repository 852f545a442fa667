//! Classifier Adapter (L4): remote complexity classification with a
//! heuristic fallback guarded by a circuit breaker.

pub mod circuit_breaker;
pub mod heuristic;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use taskstore::{Classification, ClassificationSource, Complexity, Task, TaskType};

use circuit_breaker::CircuitBreaker;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier call timed out")]
    Timeout,
    #[error("classifier call failed: {0}")]
    Failed(String),
}

/// Result of calling the external classifier (before the heuristic
/// fallback layer adds its own `source`).
#[derive(Debug, Clone)]
pub struct RemoteClassification {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub confidence: f32,
}

/// The external classifier collaborator. Transport is implementation
/// defined (HTTP/JSON per §6); this trait is the seam a real client plugs
/// into.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify_remote(&self, task: &Task) -> Result<RemoteClassification, ClassifierError>;
}

/// Configuration for the retry/circuit-breaker policy around the remote
/// classifier.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub cb_threshold: u32,
    pub cb_reset: Duration,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            retries: 2,
            retry_delay: Duration::from_millis(50),
            cb_threshold: 3,
            cb_reset: Duration::from_secs(30),
        }
    }
}

/// Classifies tasks via the remote service when healthy, falling back to
/// the heuristic (§4.4) on timeout, non-retryable error, or an open
/// circuit. The heuristic always returns, so a fatal classifier error
/// never occurs by construction.
pub struct ClassifierAdapter {
    remote: Option<Box<dyn RemoteClassifier>>,
    policy: ClassifierPolicy,
    breaker: CircuitBreaker,
}

impl ClassifierAdapter {
    pub fn new(remote: Option<Box<dyn RemoteClassifier>>, policy: ClassifierPolicy) -> Self {
        Self {
            remote,
            breaker: CircuitBreaker::new(policy.cb_threshold, policy.cb_reset),
            policy,
        }
    }

    /// Heuristic-only adapter, for deployments/tests with no remote
    /// classifier configured.
    pub fn heuristic_only() -> Self {
        Self::new(None, ClassifierPolicy::default())
    }

    pub async fn classify(&self, task: &Task) -> Classification {
        let Some(remote) = &self.remote else {
            return self.fallback(task);
        };

        if !self.breaker.allow() {
            debug!(task_id = %task.id, "classifier: circuit open, using heuristic");
            return self.fallback(task);
        }

        let mut attempt = 0;
        loop {
            let call = remote.classify_remote(task);
            let outcome = tokio::time::timeout(self.policy.timeout, call).await;
            match outcome {
                Ok(Ok(remote_class)) => {
                    self.breaker.record_success();
                    return Classification {
                        task_type: remote_class.task_type,
                        complexity: remote_class.complexity,
                        confidence: remote_class.confidence,
                        source: ClassificationSource::Ml,
                    };
                }
                Ok(Err(e)) => {
                    warn!(task_id = %task.id, error = %e, attempt, "classifier: remote call failed");
                }
                Err(_) => {
                    warn!(task_id = %task.id, attempt, "classifier: remote call timed out");
                }
            }

            attempt += 1;
            if attempt > self.policy.retries {
                self.breaker.record_failure();
                return self.fallback(task);
            }
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }

    fn fallback(&self, task: &Task) -> Classification {
        let complexity = heuristic::classify(&task.description);
        Classification {
            task_type: task.type_hint.unwrap_or(TaskType::Other),
            complexity,
            confidence: 0.5,
            source: ClassificationSource::Heuristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn task(description: &str) -> Task {
        Task::new("user-1", "t", description)
    }

    struct AlwaysFails;

    #[async_trait]
    impl RemoteClassifier for AlwaysFails {
        async fn classify_remote(&self, _task: &Task) -> Result<RemoteClassification, ClassifierError> {
            Err(ClassifierError::Failed("boom".into()))
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl RemoteClassifier for AlwaysSucceeds {
        async fn classify_remote(&self, _task: &Task) -> Result<RemoteClassification, ClassifierError> {
            Ok(RemoteClassification {
                task_type: TaskType::Feature,
                complexity: Complexity::Epic,
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_with_no_remote() {
        let adapter = ClassifierAdapter::heuristic_only();
        let c = adapter.classify(&task("fix a typo")).await;
        assert_eq!(c.source, ClassificationSource::Heuristic);
        assert_eq!(c.complexity, Complexity::Simple);
    }

    #[tokio::test]
    async fn uses_remote_result_on_success() {
        let adapter = ClassifierAdapter::new(Some(Box::new(AlwaysSucceeds)), ClassifierPolicy::default());
        let c = adapter.classify(&task("anything")).await;
        assert_eq!(c.source, ClassificationSource::Ml);
        assert_eq!(c.complexity, Complexity::Epic);
    }

    #[tokio::test]
    async fn falls_back_after_exhausting_retries() {
        let policy = ClassifierPolicy {
            retries: 1,
            retry_delay: Duration::from_millis(1),
            ..ClassifierPolicy::default()
        };
        let adapter = ClassifierAdapter::new(Some(Box::new(AlwaysFails)), policy);
        let c = adapter.classify(&task("a totally generic task description here")).await;
        assert_eq!(c.source, ClassificationSource::Heuristic);
    }

    struct CountingFails(Arc<AtomicU32>);

    #[async_trait]
    impl RemoteClassifier for CountingFails {
        async fn classify_remote(&self, _task: &Task) -> Result<RemoteClassification, ClassifierError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ClassifierError::Failed("boom".into()))
        }
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures() {
        let policy = ClassifierPolicy {
            retries: 0,
            retry_delay: Duration::from_millis(1),
            cb_threshold: 2,
            cb_reset: Duration::from_secs(30),
            ..ClassifierPolicy::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = ClassifierAdapter::new(Some(Box::new(CountingFails(calls.clone()))), policy);

        adapter.classify(&task("one")).await;
        adapter.classify(&task("two")).await;
        let after_two = calls.load(Ordering::SeqCst);
        // third call should be short-circuited by the now-open breaker
        adapter.classify(&task("three")).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_two);
    }
}
