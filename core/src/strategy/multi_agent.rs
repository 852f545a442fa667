//! MultiAgent strategy (L7): Planner → Executor → Reviewer role
//! decomposition, at most one review cycle.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use taskstore::{ChangeType, FileChange, IterationRecord, Task};

use crate::llm::{CompletionRequest, LlmError, Message};
use crate::parser;

use super::{Strategy, StrategyContext, StrategyExecutionResult, STRATEGY_MULTI_AGENT};

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 4000;
pub const WALL_CLOCK_CAP: Duration = Duration::from_secs(180);

const PLANNER_SYSTEM_PROMPT: &str = "You are a technical planner. Decompose the task into an ordered list of \
subtasks. Respond with exactly one JSON object and nothing else, in this shape: \
{\"subtasks\":[{\"title\":\"...\",\"description\":\"...\",\"target_files\":[\"path\", ...]}]}";

const REVIEWER_SYSTEM_PROMPT: &str = "You are a meticulous code reviewer. Respond with exactly one JSON object \
and nothing else, in this shape: {\"approved\": true} or {\"approved\": false, \"issues\": [\"...\", ...]}";

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Deserialize)]
struct Subtask {
    title: String,
    description: String,
    #[serde(default)]
    target_files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewOutput {
    approved: bool,
    #[serde(default)]
    issues: Vec<String>,
}

/// A planner/executor/reviewer role call failure, distinguishing a
/// deadline miss (which must surface as `TimedOut`, not `Failed`) from
/// every other reason.
enum RoleError {
    DeadlineExceeded,
    Other { reason: String, errors: Vec<String> },
}

impl RoleError {
    fn other(reason: impl Into<String>) -> Self {
        Self::Other { reason: reason.into(), errors: Vec::new() }
    }
}

impl From<LlmError> for RoleError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::DeadlineExceeded => Self::DeadlineExceeded,
            other => Self::other(other.to_string()),
        }
    }
}

pub struct MultiAgentStrategy;

impl MultiAgentStrategy {
    async fn plan(&self, task: &Task, ctx: &StrategyContext, remaining: Duration) -> Result<(PlannerOutput, u64, f64), RoleError> {
        let prompt = format!(
            "Task: {}\nDescription: {}\n\nDecompose this into subtasks.",
            task.title, task.description
        );
        let request = CompletionRequest {
            model_id: ctx.model_id.clone(),
            messages: vec![Message::system(PLANNER_SYSTEM_PROMPT), Message::user(prompt)],
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        };
        let response = ctx.llm.generate(request, remaining).await?;
        let parsed: PlannerOutput =
            serde_json::from_str(response.content.trim()).map_err(|_| RoleError::other("planner-parse-failed"))?;
        Ok((parsed, response.tokens_used(), response.cost_usd))
    }

    /// Runs one subtask as a mini SingleShot: one LLM call followed by one
    /// validation pass over the changes it produced, before they are
    /// merged or used as context for the next subtask/round.
    async fn execute_subtask(
        &self,
        task: &Task,
        subtask: &Subtask,
        feedback: Option<&str>,
        ctx: &StrategyContext,
        remaining: Duration,
    ) -> Result<(Vec<FileChange>, u64, f64), RoleError> {
        let mut prompt = format!(
            "Overall task: {}\nSubtask: {}\nDetails: {}\nTarget files: {}\n",
            task.title,
            subtask.title,
            subtask.description,
            subtask.target_files.join(", ")
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!("\nReviewer feedback to address:\n{feedback}\n"));
        }
        let request = CompletionRequest {
            model_id: ctx.model_id.clone(),
            messages: vec![Message::system(super::SYSTEM_PROMPT), Message::user(prompt)],
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        };
        let response = ctx.llm.generate(request, remaining).await?;
        let changes = parser::parse(&response.content);

        let validation = ctx.validator.validate(&changes).await;
        if !validation.ok {
            warn!(task_id = %task.id, subtask = %subtask.title, "multi_agent: subtask failed validation");
            return Err(RoleError::Other {
                reason: format!("subtask '{}' failed validation", subtask.title),
                errors: validation.errors,
            });
        }

        Ok((changes, response.tokens_used(), response.cost_usd))
    }

    async fn review(
        &self,
        task: &Task,
        merged: &[FileChange],
        ctx: &StrategyContext,
        remaining: Duration,
    ) -> Result<(ReviewOutput, u64, f64), RoleError> {
        let summary: String = merged.iter().map(|c| format!("- {} ({:?})\n", c.path, c.change_type)).collect();
        let prompt = format!("Task: {}\nChanged files:\n{summary}", task.title);
        let request = CompletionRequest {
            model_id: ctx.model_id.clone(),
            messages: vec![Message::system(REVIEWER_SYSTEM_PROMPT), Message::user(prompt)],
            temperature: TEMPERATURE,
            max_output_tokens: 1000,
        };
        let response = ctx.llm.generate(request, remaining).await?;
        match serde_json::from_str::<ReviewOutput>(response.content.trim()) {
            Ok(parsed) => Ok((parsed, response.tokens_used(), response.cost_usd)),
            Err(_) => {
                warn!(task_id = %task.id, "multi_agent: reviewer output unparseable, treating as approved");
                Ok((ReviewOutput { approved: true, issues: Vec::new() }, response.tokens_used(), response.cost_usd))
            }
        }
    }
}

/// Merge per-subtask change sets by path, last-write-wins, warning on
/// conflict.
fn merge_changes(batches: Vec<Vec<FileChange>>) -> Vec<FileChange> {
    let mut by_path: HashMap<String, FileChange> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for batch in batches {
        for change in batch {
            if by_path.contains_key(&change.path) {
                warn!(path = %change.path, "multi_agent: conflicting subtask writes, last write wins");
            } else {
                order.push(change.path.clone());
            }
            by_path.insert(change.path.clone(), change);
        }
    }
    order.into_iter().filter_map(|p| by_path.remove(&p)).collect()
}

#[async_trait]
impl Strategy for MultiAgentStrategy {
    async fn execute(&self, task: &Task, ctx: &StrategyContext) -> StrategyExecutionResult {
        let start = Instant::now();
        let deadline = start + WALL_CLOCK_CAP;
        let mut tokens_used = 0u64;
        let mut cost_usd = 0.0f64;
        let iterations: Vec<IterationRecord> = Vec::new();

        let remaining = || deadline.saturating_duration_since(Instant::now()).min(ctx.remaining());

        let (plan, plan_tokens, plan_cost) = match self.plan(task, ctx, remaining()).await {
            Ok(v) => v,
            Err(RoleError::DeadlineExceeded) => {
                return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
            }
            Err(RoleError::Other { reason, errors }) => {
                return StrategyExecutionResult::failed(reason, errors, iterations, tokens_used, cost_usd);
            }
        };
        tokens_used += plan_tokens;
        cost_usd += plan_cost;
        debug!(task_id = %task.id, subtasks = plan.subtasks.len(), "multi_agent: plan received");

        if ctx.cancel.is_cancelled() {
            return StrategyExecutionResult::cancelled(iterations, tokens_used, cost_usd);
        }

        let mut batches = Vec::new();
        for subtask in &plan.subtasks {
            if ctx.cancel.is_cancelled() {
                return StrategyExecutionResult::cancelled(iterations, tokens_used, cost_usd);
            }
            match self.execute_subtask(task, subtask, None, ctx, remaining()).await {
                Ok((changes, t, c)) => {
                    tokens_used += t;
                    cost_usd += c;
                    batches.push(changes);
                }
                Err(RoleError::DeadlineExceeded) => {
                    return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
                }
                Err(RoleError::Other { reason, errors }) => {
                    return StrategyExecutionResult::failed(reason, errors, iterations, tokens_used, cost_usd);
                }
            }
        }

        let mut merged = merge_changes(batches);

        let (review, review_tokens, review_cost) = match self.review(task, &merged, ctx, remaining()).await {
            Ok(v) => v,
            Err(RoleError::DeadlineExceeded) => {
                return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
            }
            Err(RoleError::Other { reason, errors }) => {
                return StrategyExecutionResult::failed(reason, errors, iterations, tokens_used, cost_usd);
            }
        };
        tokens_used += review_tokens;
        cost_usd += review_cost;

        if !review.approved {
            debug!(task_id = %task.id, issues = review.issues.len(), "multi_agent: review requested changes, one retry cycle");
            let feedback = review.issues.join("; ");
            let mut batches = Vec::new();
            for subtask in &plan.subtasks {
                if ctx.cancel.is_cancelled() {
                    return StrategyExecutionResult::cancelled(iterations, tokens_used, cost_usd);
                }
                match self.execute_subtask(task, subtask, Some(&feedback), ctx, remaining()).await {
                    Ok((changes, t, c)) => {
                        tokens_used += t;
                        cost_usd += c;
                        batches.push(changes);
                    }
                    Err(RoleError::DeadlineExceeded) => {
                        return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
                    }
                    Err(RoleError::Other { reason, errors }) => {
                        return StrategyExecutionResult::failed(reason, errors, iterations, tokens_used, cost_usd);
                    }
                }
            }
            merged = merge_changes(batches);
        }

        if merged.is_empty() {
            return StrategyExecutionResult::failed("no parseable changes", Vec::new(), iterations, tokens_used, cost_usd);
        }

        let validation = ctx.validator.validate(&merged).await;
        if !validation.ok {
            return StrategyExecutionResult::failed("validation failed", validation.errors, iterations, tokens_used, cost_usd);
        }

        StrategyExecutionResult::succeeded(merged, iterations, tokens_used, cost_usd)
    }

    fn name(&self) -> &'static str {
        STRATEGY_MULTI_AGENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatherer::TaskExecutionContext;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, LlmError};
    use crate::strategy::{CancelToken, StrategyOutcome};
    use crate::validator::Validator;
    use std::sync::Arc;

    fn response(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tokens_prompt: 10,
            tokens_completion: 10,
            cost_usd: 0.01,
            model_id: "claude-opus-4".to_string(),
        }
    }

    fn ctx_with(responses: Vec<Result<CompletionResponse, LlmError>>) -> StrategyContext {
        StrategyContext {
            execution_id: taskstore::ExecutionId::new(),
            deadline: Instant::now() + Duration::from_secs(300),
            cancel: CancelToken::new(),
            llm: Arc::new(MockLlmClient::new(responses)),
            validator: Arc::new(Validator::new()),
            model_id: "claude-opus-4".to_string(),
            task_context: TaskExecutionContext::default(),
        }
    }

    #[tokio::test]
    async fn happy_path_plans_executes_and_approves() {
        let task = Task::new("u", "t", "a complex multi-file refactor");
        let plan = response(r#"{"subtasks":[{"title":"part one","description":"d","target_files":["a.rs"]}]}"#);
        let executor = response("FILE: a.rs\n```rust\nfn a() {}\n```\n");
        let review = response(r#"{"approved": true}"#);
        let ctx = ctx_with(vec![Ok(plan), Ok(executor), Ok(review)]);

        let result = MultiAgentStrategy.execute(&task, &ctx).await;
        assert_eq!(result.outcome, StrategyOutcome::Succeeded);
        assert_eq!(result.changes.len(), 1);
    }

    #[tokio::test]
    async fn malformed_planner_output_fails_with_typed_reason() {
        let task = Task::new("u", "t", "a complex multi-file refactor");
        let ctx = ctx_with(vec![Ok(response("not json at all"))]);
        let result = MultiAgentStrategy.execute(&task, &ctx).await;
        match result.outcome {
            StrategyOutcome::Failed { reason, .. } => assert_eq!(reason, "planner-parse-failed"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_review_cycle_on_rejection() {
        let task = Task::new("u", "t", "a complex multi-file refactor");
        let plan = response(r#"{"subtasks":[{"title":"part one","description":"d","target_files":["a.rs"]}]}"#);
        let executor1 = response("FILE: a.rs\n```rust\nfn a() {}\n```\n");
        let review1 = response(r#"{"approved": false, "issues": ["missing error handling"]}"#);
        let executor2 = response("FILE: a.rs\n```rust\nfn a() -> Result<(), ()> { Ok(()) }\n```\n");
        let ctx = ctx_with(vec![Ok(plan), Ok(executor1), Ok(review1), Ok(executor2)]);

        let result = MultiAgentStrategy.execute(&task, &ctx).await;
        assert_eq!(result.outcome, StrategyOutcome::Succeeded);
        assert!(result.changes[0].content.contains("Result"));
    }

    #[tokio::test]
    async fn execute_subtask_validates_before_returning() {
        let task = Task::new("u", "t", "a complex multi-file refactor");
        let subtask = Subtask {
            title: "part one".to_string(),
            description: "d".to_string(),
            target_files: vec!["../escape.rs".to_string()],
        };
        let ctx = ctx_with(vec![Ok(response("FILE: ../escape.rs\n```rust\nfn a() {}\n```\n"))]);

        let result = MultiAgentStrategy.execute_subtask(&task, &subtask, None, &ctx, Duration::from_secs(30)).await;

        match result {
            Err(RoleError::Other { reason, errors }) => {
                assert!(reason.contains("failed validation"));
                assert!(!errors.is_empty());
            }
            other => panic!("expected validation failure, got {}", if other.is_ok() { "Ok" } else { "DeadlineExceeded" }),
        }
    }

    #[tokio::test]
    async fn conflicting_subtask_writes_last_write_wins() {
        let batches = vec![
            vec![FileChange {
                path: "a.rs".into(),
                language: None,
                change_type: ChangeType::Modify,
                content: "first".into(),
            }],
            vec![FileChange {
                path: "a.rs".into(),
                language: None,
                change_type: ChangeType::Modify,
                content: "second".into(),
            }],
        ];
        let merged = merge_changes(batches);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "second");
    }
}
