//! Task Executor (L9): the concurrency core. Drives one task from
//! `Pending` to a terminal status with exactly-once terminal outcome,
//! at-least-once event publication, and correct resource accounting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use taskstore::{ChangeSet, Execution, ExecutionStatus, OutboxKind, Task, TaskId, TaskStatus, TaskStore};

use crate::classifier::ClassifierAdapter;
use crate::config::Config;
use crate::events::{TaskCancelled, TaskFailed, TaskSucceeded, TaskTimedOut, SCHEMA_VERSION};
use crate::gatherer::ContextGatherer;
use crate::intake::{IntakeService, SubmitTaskRequest};
use crate::llm::LlmClient;
use crate::strategy::iterative::IterativeStrategy;
use crate::strategy::multi_agent::MultiAgentStrategy;
use crate::strategy::single_shot::SingleShotStrategy;
use crate::strategy::{
    select_strategy, CancelToken, Strategy, StrategyContext, StrategyExecutionResult, StrategyOutcome,
    STRATEGY_ITERATIVE, STRATEGY_MULTI_AGENT, STRATEGY_SINGLE_SHOT,
};
use crate::validator::Validator;

/// Grace period after the task deadline before the executor gives up
/// waiting on an unresponsive strategy (§5 "Timeouts").
const ABANDON_GRACE: Duration = Duration::from_secs(2);

fn strategy_for_name(name: &str) -> Box<dyn Strategy> {
    match name {
        STRATEGY_SINGLE_SHOT => Box::new(SingleShotStrategy),
        STRATEGY_ITERATIVE => Box::new(IterativeStrategy),
        STRATEGY_MULTI_AGENT => Box::new(MultiAgentStrategy),
        other => {
            warn!(strategy = other, "executor: unknown strategy name, defaulting to SingleShot");
            Box::new(SingleShotStrategy)
        }
    }
}

pub struct TaskExecutor {
    store: TaskStore,
    intake: IntakeService,
    classifier: ClassifierAdapter,
    gatherer: Arc<dyn ContextGatherer>,
    llm: Arc<dyn LlmClient>,
    validator: Arc<Validator>,
    config: Config,
    cancels: Mutex<HashMap<TaskId, CancelToken>>,
}

impl TaskExecutor {
    pub fn new(
        store: TaskStore,
        classifier: ClassifierAdapter,
        gatherer: Arc<dyn ContextGatherer>,
        llm: Arc<dyn LlmClient>,
        validator: Arc<Validator>,
        config: Config,
    ) -> Self {
        Self {
            intake: IntakeService::new(store.clone(), config.worker.worker_pool_size, config.outbox.backlog_watermark),
            store,
            classifier,
            gatherer,
            llm,
            validator,
            config,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// `submit(task) -> task-id`: delegates to Intake.
    pub async fn submit(&self, request: SubmitTaskRequest) -> eyre::Result<TaskId> {
        self.intake.submit(request).await
    }

    /// Best-effort cancellation: signals the running strategy to stop at
    /// its next safe point. A no-op if the task has no in-flight execution
    /// on this instance.
    pub fn cancel(&self, task_id: TaskId) {
        if let Some(token) = self.cancels.lock().unwrap().get(&task_id) {
            token.cancel();
        }
    }

    /// Drive one task through the full lifecycle (§4.9). Idempotent: a task
    /// already `Executing` or terminal returns its current state untouched.
    pub async fn run(&self, task_id: TaskId) -> eyre::Result<Task> {
        // Step 1: Pending -> Classifying.
        if let Err(e) = self.store.cas_task_status(task_id, TaskStatus::Pending, TaskStatus::Classifying).await {
            debug!(%task_id, error = %e, "executor: task not eligible to start, returning current state");
            return Ok(self.store.get_task(task_id).await?);
        }

        let task = self.store.get_task(task_id).await?;

        // Step 2: classify and persist the decision.
        let classification = self.classifier.classify(&task).await;
        self.store.set_classification(task_id, classification.clone()).await?;

        // Step 3: select a strategy.
        let strategy_name = select_strategy(&task, &classification);

        // Step 4: atomically create the Execution row and move to Executing.
        let execution = Execution::new(task_id, strategy_name);
        self.store.start_execution(task_id, &execution).await?;

        let cancel = CancelToken::new();
        self.cancels.lock().unwrap().insert(task_id, cancel.clone());

        let deadline_sec = self.config.deadline_sec(classification.complexity);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(deadline_sec);
        let model_id = self.config.model_for(classification.complexity);

        let task_context = self.gatherer.gather(&task.title, &task.description).await.unwrap_or_default();

        let ctx = StrategyContext {
            execution_id: execution.id,
            deadline,
            cancel: cancel.clone(),
            llm: self.llm.clone(),
            validator: self.validator.clone(),
            model_id,
            task_context,
        };

        // Step 5 + 6: invoke the strategy, bounded by the deadline plus a
        // short grace window before the executor gives up on it outright.
        let strategy = strategy_for_name(strategy_name);
        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(deadline_sec) + ABANDON_GRACE,
            strategy.execute(&task, &ctx),
        )
        .await;

        self.cancels.lock().unwrap().remove(&task_id);

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(%task_id, "executor: strategy did not return within the deadline grace window, abandoning");
                StrategyExecutionResult {
                    outcome: StrategyOutcome::TimedOut,
                    changes: Vec::new(),
                    iterations: Vec::new(),
                    tokens_used: 0,
                    cost_usd: 0.0,
                }
            }
        };

        // Step 7: single-transaction terminal commit.
        let outbox_id = self.finalize(&task, &execution, result, started.elapsed().as_millis() as u64).await?;

        // Step 8: nudge the Event Publisher. This instance's own publisher
        // loop (if any) polls on its own interval regardless; logging the
        // outbox id here is the "nudge" for operators tailing logs.
        debug!(%task_id, %outbox_id, "executor: terminal transaction committed");

        Ok(self.store.get_task(task_id).await?)
    }

    async fn finalize(
        &self,
        task: &Task,
        execution: &Execution,
        result: StrategyExecutionResult,
        elapsed_ms: u64,
    ) -> eyre::Result<taskstore::OutboxId> {
        for mut record in result.iterations.clone() {
            record.execution_id = execution.id;
            self.store.record_iteration(record).await?;
        }
        // SingleShot never produces IterationRecords of its own; synthesize
        // one so `execution.tokens_used` still reflects the single call.
        if result.iterations.is_empty() && (result.tokens_used > 0 || result.cost_usd > 0.0) {
            self.store
                .record_iteration(taskstore::IterationRecord {
                    execution_id: execution.id,
                    index: 0,
                    prompt_length: 0,
                    tokens_used: result.tokens_used,
                    cost_usd: result.cost_usd,
                    validation_error_count: if result.outcome == StrategyOutcome::Succeeded { 0 } else { 1 },
                    duration_ms: elapsed_ms,
                })
                .await?;
        }

        let occurred_at = taskstore::ids::now_ms();
        let iterations_count = result.iterations.len().max(1) as u32;

        match result.outcome {
            StrategyOutcome::Succeeded => {
                let change_set = ChangeSet::from_files(execution.id, result.changes);
                let event = TaskSucceeded {
                    event_id: taskstore::OutboxId::new().to_string(),
                    schema_version: SCHEMA_VERSION,
                    task_id: task.id,
                    execution_id: execution.id,
                    strategy: execution.strategy.clone(),
                    iterations: iterations_count,
                    tokens: result.tokens_used,
                    cost_usd: result.cost_usd,
                    files_changed: change_set.files_changed,
                    lines_added: change_set.lines_added,
                    lines_removed: change_set.lines_removed,
                    changeset_id: change_set.id.to_string(),
                    occurred_at,
                };
                let payload = serde_json::to_string(&event)?;
                info!(task_id = %task.id, "executor: task succeeded");
                Ok(self
                    .store
                    .finalize(
                        execution.id,
                        ExecutionStatus::Succeeded,
                        None,
                        Some(change_set),
                        task.id,
                        TaskStatus::Succeeded,
                        OutboxKind::TaskCompleted,
                        payload,
                    )
                    .await?)
            }
            StrategyOutcome::Failed { reason, errors } => {
                let event = TaskFailed {
                    event_id: taskstore::OutboxId::new().to_string(),
                    schema_version: SCHEMA_VERSION,
                    task_id: task.id,
                    execution_id: execution.id,
                    strategy: execution.strategy.clone(),
                    iterations: iterations_count,
                    tokens: result.tokens_used,
                    cost_usd: result.cost_usd,
                    reason: reason.clone(),
                    errors,
                    occurred_at,
                };
                let payload = serde_json::to_string(&event)?;
                warn!(task_id = %task.id, reason, "executor: task failed");
                Ok(self
                    .store
                    .finalize(
                        execution.id,
                        ExecutionStatus::Failed,
                        Some(reason),
                        None,
                        task.id,
                        TaskStatus::Failed,
                        OutboxKind::TaskFailed,
                        payload,
                    )
                    .await?)
            }
            StrategyOutcome::Cancelled => {
                let event = TaskCancelled {
                    event_id: taskstore::OutboxId::new().to_string(),
                    schema_version: SCHEMA_VERSION,
                    task_id: task.id,
                    execution_id: Some(execution.id),
                    occurred_at,
                };
                let payload = serde_json::to_string(&event)?;
                info!(task_id = %task.id, "executor: task cancelled");
                Ok(self
                    .store
                    .finalize(
                        execution.id,
                        ExecutionStatus::Cancelled,
                        Some("cancelled".to_string()),
                        None,
                        task.id,
                        TaskStatus::Cancelled,
                        OutboxKind::TaskCancelled,
                        payload,
                    )
                    .await?)
            }
            StrategyOutcome::TimedOut => {
                let event = TaskTimedOut {
                    event_id: taskstore::OutboxId::new().to_string(),
                    schema_version: SCHEMA_VERSION,
                    task_id: task.id,
                    execution_id: Some(execution.id),
                    elapsed_ms,
                    occurred_at,
                };
                let payload = serde_json::to_string(&event)?;
                warn!(task_id = %task.id, "executor: task timed out");
                Ok(self
                    .store
                    .finalize(
                        execution.id,
                        ExecutionStatus::TimedOut,
                        Some("deadline exceeded".to_string()),
                        None,
                        task.id,
                        TaskStatus::TimedOut,
                        OutboxKind::TaskTimedOut,
                        payload,
                    )
                    .await?)
            }
        }
    }
}
