//! End-to-end lifecycle tests driving `TaskExecutor` through a real
//! in-memory `TaskStore`, exercising the scenarios the component
//! contract calls out explicitly: simple success, iterative retry and
//! exhaustion, cancellation, and deadline handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use orchestrator_core::classifier::ClassifierAdapter;
use orchestrator_core::config::Config;
use orchestrator_core::executor::TaskExecutor;
use orchestrator_core::gatherer::EmptyContextGatherer;
use orchestrator_core::intake::SubmitTaskRequest;
use orchestrator_core::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use orchestrator_core::strategy::STRATEGY_MULTI_AGENT;
use orchestrator_core::validator::Validator;

use taskstore::{TaskStatus, TaskStore};

/// Replays a fixed sequence of responses/errors, one per call, optionally
/// sleeping first to simulate a slow upstream.
struct ScriptedLlmClient {
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    call_count: AtomicUsize,
    delay: Duration,
}

impl ScriptedLlmClient {
    fn new(responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn slow(responses: Vec<Result<CompletionResponse, LlmError>>, delay: Duration) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, _request: CompletionRequest, timeout: Duration) -> Result<CompletionResponse, LlmError> {
        let call = async {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Unknown("scripted client exhausted".to_string()));
            }
            responses.remove(0)
        };
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::DeadlineExceeded),
        }
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

fn ok_response(content: &str) -> Result<CompletionResponse, LlmError> {
    Ok(CompletionResponse {
        content: content.to_string(),
        tokens_prompt: 10,
        tokens_completion: 20,
        cost_usd: 0.01,
        model_id: "claude-sonnet-4".to_string(),
    })
}

fn executor_with(llm: Arc<dyn LlmClient>, store: TaskStore, config: Config) -> TaskExecutor {
    TaskExecutor::new(
        store,
        ClassifierAdapter::heuristic_only(),
        Arc::new(EmptyContextGatherer),
        llm,
        Arc::new(Validator::new()),
        config,
    )
}

fn submit_request(title: &str, description: &str) -> SubmitTaskRequest {
    SubmitTaskRequest {
        user_id: "user-1".to_string(),
        title: title.to_string(),
        description: description.to_string(),
        type_hint: None,
        override_strategy: None,
        priority: None,
        client_token: None,
    }
}

#[tokio::test]
async fn simple_bug_fix_succeeds_via_single_shot() {
    let store = TaskStore::open_in_memory().await.unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![ok_response("FILE: a.rs\n```rust\nfn fixed() {}\n```\n")]));
    let executor = executor_with(llm, store.clone(), Config::default());

    let task_id = executor.submit(submit_request("Fix a typo", "fix a small typo")).await.unwrap();
    let task = executor.run(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Succeeded);
    let executions = store.list_executions_for_task(task_id).await.unwrap();
    assert_eq!(executions[0].strategy, "SingleShot");
    let outbox = store.fetch_outbox_batch(10).await.unwrap();
    assert_eq!(outbox.len(), 1);
}

#[tokio::test]
async fn medium_task_succeeds_after_a_retry() {
    let store = TaskStore::open_in_memory().await.unwrap();
    let bad = "FILE: ../escape.rs\n```rust\nfn a() {}\n```\n";
    let good = "FILE: b.rs\n```rust\nfn fixed() {}\n```\n";
    let llm = Arc::new(ScriptedLlmClient::new(vec![ok_response(bad), ok_response(good)]));
    let executor = executor_with(llm, store.clone(), Config::default());

    let description = "Please update the onboarding email template to include the new pricing \
        tiers and a link to the updated documentation page for customers";
    let task_id = executor.submit(submit_request("Update email template", description)).await.unwrap();
    let task = executor.run(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Succeeded);
    let executions = store.list_executions_for_task(task_id).await.unwrap();
    assert_eq!(executions[0].strategy, "Iterative");
    let iterations = store.list_iterations(executions[0].id).await.unwrap();
    assert_eq!(iterations.len(), 2);
}

#[tokio::test]
async fn medium_task_fails_after_exhausting_iterations() {
    let store = TaskStore::open_in_memory().await.unwrap();
    let bad = "FILE: ../escape.rs\n```rust\nfn a() {}\n```\n";
    let llm = Arc::new(ScriptedLlmClient::new(vec![ok_response(bad), ok_response(bad), ok_response(bad)]));
    let executor = executor_with(llm, store.clone(), Config::default());

    let description = "Please update the onboarding email template to include the new pricing \
        tiers and a link to the updated documentation page for customers";
    let task_id = executor.submit(submit_request("Update email template", description)).await.unwrap();
    let task = executor.run(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    let executions = store.list_executions_for_task(task_id).await.unwrap();
    assert_eq!(executions[0].failure_reason.as_deref(), Some("max iterations exceeded"));
}

#[tokio::test]
async fn manual_override_selects_multi_agent_even_for_a_short_task() {
    let store = TaskStore::open_in_memory().await.unwrap();
    let planner = ok_response(
        r#"{"subtasks": [{"title": "t", "description": "d", "target_files": ["a.rs"]}]}"#,
    );
    let subtask = ok_response("FILE: a.rs\n```rust\nfn a() {}\n```\n");
    let review = ok_response(r#"{"approved": true, "issues": []}"#);
    let llm = Arc::new(ScriptedLlmClient::new(vec![planner, subtask, review]));

    let mut request = submit_request("Fix a typo", "fix a small typo");
    request.override_strategy = Some(STRATEGY_MULTI_AGENT.to_string());
    let executor = executor_with(llm, store.clone(), Config::default());

    let task_id = executor.submit(request).await.unwrap();
    let task = executor.run(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Succeeded);
    let executions = store.list_executions_for_task(task_id).await.unwrap();
    assert_eq!(executions[0].strategy, STRATEGY_MULTI_AGENT);
}

#[tokio::test]
async fn cancellation_mid_flight_marks_task_cancelled() {
    let store = TaskStore::open_in_memory().await.unwrap();
    // three slow responses so the cancel has time to land between iterations
    let bad = "FILE: ../escape.rs\n```rust\nfn a() {}\n```\n";
    let llm = Arc::new(ScriptedLlmClient::slow(
        vec![ok_response(bad), ok_response(bad), ok_response(bad)],
        Duration::from_millis(150),
    ));
    let executor = Arc::new(executor_with(llm, store.clone(), Config::default()));

    let description = "Please update the onboarding email template to include the new pricing \
        tiers and a link to the updated documentation page for customers";
    let task_id = executor.submit(submit_request("Update email template", description)).await.unwrap();

    let run_executor = executor.clone();
    let handle = tokio::spawn(async move { run_executor.run(task_id).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    executor.cancel(task_id);

    let task = handle.await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn deadline_exceeded_marks_task_timed_out() {
    let store = TaskStore::open_in_memory().await.unwrap();
    let llm = Arc::new(ScriptedLlmClient::slow(vec![ok_response("FILE: a.rs\n```rust\nfn a() {}\n```\n")], Duration::from_secs(3)));

    let mut config = Config::default();
    config.worker.task_deadline_simple_sec = 0;
    let executor = executor_with(llm, store.clone(), config);

    let task_id = executor.submit(submit_request("Fix a typo", "fix a small typo")).await.unwrap();
    let task = executor.run(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::TimedOut);
}
