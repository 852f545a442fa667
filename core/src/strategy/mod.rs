//! Strategies (L5–L7) and the selector (L8) that picks among them.
//!
//! The three strategies share one contract, `execute(task, context) ->
//! StrategyExecutionResult`, as an async trait with three concrete types;
//! the selector returns a boxed trait object (§9).

pub mod context;
pub mod iterative;
pub mod multi_agent;
pub mod selector;
pub mod single_shot;

use async_trait::async_trait;

use taskstore::{FileChange, IterationRecord, Task};

pub use context::{CancelToken, StrategyContext};
pub use selector::select_strategy;

/// Strategy names as stored on the `Execution` row.
pub const STRATEGY_SINGLE_SHOT: &str = "SingleShot";
pub const STRATEGY_ITERATIVE: &str = "Iterative";
pub const STRATEGY_MULTI_AGENT: &str = "MultiAgent";

/// The sole authoritative strategy return type (§9): either a finished
/// ChangeSet or a typed failure, always carrying accumulated totals.
#[derive(Debug, Clone)]
pub struct StrategyExecutionResult {
    pub outcome: StrategyOutcome,
    pub changes: Vec<FileChange>,
    pub iterations: Vec<IterationRecord>,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Succeeded,
    Failed { reason: String, errors: Vec<String> },
    Cancelled,
    TimedOut,
}

impl StrategyExecutionResult {
    pub fn succeeded(changes: Vec<FileChange>, iterations: Vec<IterationRecord>, tokens_used: u64, cost_usd: f64) -> Self {
        Self {
            outcome: StrategyOutcome::Succeeded,
            changes,
            iterations,
            tokens_used,
            cost_usd,
        }
    }

    pub fn failed(
        reason: impl Into<String>,
        errors: Vec<String>,
        iterations: Vec<IterationRecord>,
        tokens_used: u64,
        cost_usd: f64,
    ) -> Self {
        Self {
            outcome: StrategyOutcome::Failed {
                reason: reason.into(),
                errors,
            },
            changes: Vec::new(),
            iterations,
            tokens_used,
            cost_usd,
        }
    }

    pub fn cancelled(iterations: Vec<IterationRecord>, tokens_used: u64, cost_usd: f64) -> Self {
        Self {
            outcome: StrategyOutcome::Cancelled,
            changes: Vec::new(),
            iterations,
            tokens_used,
            cost_usd,
        }
    }

    pub fn timed_out(iterations: Vec<IterationRecord>, tokens_used: u64, cost_usd: f64) -> Self {
        Self {
            outcome: StrategyOutcome::TimedOut,
            changes: Vec::new(),
            iterations,
            tokens_used,
            cost_usd,
        }
    }
}

/// A control-flow template coordinating LLM calls and validation for one
/// execution.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(&self, task: &Task, ctx: &StrategyContext) -> StrategyExecutionResult;

    fn name(&self) -> &'static str;
}

/// Deterministic user-prompt assembly shared by SingleShot and Iterative:
/// task header, then each relevant file, then (if non-empty) a validation
/// errors section.
pub(crate) fn build_user_prompt(task: &Task, ctx: &StrategyContext, errors: &[String]) -> String {
    let mut prompt = format!(
        "Task: {}\nDescription: {}\nType: {}\n\n",
        task.title,
        task.description,
        task.type_hint.map(|t| t.as_str()).unwrap_or("other")
    );

    for file in &ctx.task_context.files {
        prompt.push_str(&format!("## {}\n```\n{}\n```\n\n", file.path, file.content));
    }

    if !errors.is_empty() {
        prompt.push_str("Validation errors from the previous attempt:\n");
        for e in errors {
            prompt.push_str(&format!("- {e}\n"));
        }
    }

    prompt
}

pub(crate) const SYSTEM_PROMPT: &str = "You are an expert software engineer. Output every file you change \
using the exact format:\nFILE: <path>\n```<language>\n<full file content>\n```\nEmit nothing else outside that format.";
