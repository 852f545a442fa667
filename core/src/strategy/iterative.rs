//! Iterative strategy (L6): bounded multi-turn loop feeding validation
//! errors back into the prompt.

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use taskstore::{IterationRecord, Task};

use crate::llm::{CompletionRequest, LlmError, Message};
use crate::parser;

use super::{build_user_prompt, Strategy, StrategyContext, StrategyExecutionResult, STRATEGY_ITERATIVE, SYSTEM_PROMPT};

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 4000;
pub const MAX_ITERATIONS: u32 = 3;
pub const WALL_CLOCK_CAP: Duration = Duration::from_secs(60);

pub struct IterativeStrategy;

#[async_trait]
impl Strategy for IterativeStrategy {
    async fn execute(&self, task: &Task, ctx: &StrategyContext) -> StrategyExecutionResult {
        let start = Instant::now();
        let strategy_deadline = start + WALL_CLOCK_CAP;
        let mut errors: Vec<String> = Vec::new();
        let mut iterations = Vec::new();
        let mut tokens_used = 0u64;
        let mut cost_usd = 0.0f64;

        for index in 0..MAX_ITERATIONS {
            if ctx.cancel.is_cancelled() {
                debug!(task_id = %task.id, iteration = index, "iterative: cancelled");
                return StrategyExecutionResult::cancelled(iterations, tokens_used, cost_usd);
            }

            let remaining = strategy_deadline.saturating_duration_since(Instant::now()).min(ctx.remaining());
            if remaining.is_zero() {
                return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
            }

            let iter_start = Instant::now();
            let prompt = build_user_prompt(task, ctx, &errors);
            let prompt_length = prompt.len() as u32;

            let request = CompletionRequest {
                model_id: ctx.model_id.clone(),
                messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            };

            let response = match ctx.llm.generate(request, remaining).await {
                Ok(r) => r,
                Err(LlmError::DeadlineExceeded) => {
                    warn!(task_id = %task.id, iteration = index, "iterative: llm call exceeded its deadline");
                    iterations.push(IterationRecord {
                        execution_id: ctx.execution_id,
                        index,
                        prompt_length,
                        tokens_used: 0,
                        cost_usd: 0.0,
                        validation_error_count: 1,
                        duration_ms: iter_start.elapsed().as_millis() as u64,
                    });
                    return StrategyExecutionResult::timed_out(iterations, tokens_used, cost_usd);
                }
                Err(e) => {
                    warn!(task_id = %task.id, iteration = index, error = %e, "iterative: llm call failed");
                    errors = vec![e.to_string()];
                    iterations.push(IterationRecord {
                        execution_id: ctx.execution_id,
                        index,
                        prompt_length,
                        tokens_used: 0,
                        cost_usd: 0.0,
                        validation_error_count: 1,
                        duration_ms: iter_start.elapsed().as_millis() as u64,
                    });
                    continue;
                }
            };

            tokens_used += response.tokens_used();
            cost_usd += response.cost_usd;

            let changes = parser::parse(&response.content);
            if changes.is_empty() {
                return StrategyExecutionResult::failed("no parseable changes", errors, iterations, tokens_used, cost_usd);
            }

            let validation = ctx.validator.validate(&changes).await;
            iterations.push(IterationRecord {
                execution_id: ctx.execution_id,
                index,
                prompt_length,
                tokens_used: response.tokens_used(),
                cost_usd: response.cost_usd,
                validation_error_count: validation.errors.len() as u32,
                duration_ms: iter_start.elapsed().as_millis() as u64,
            });

            if validation.ok {
                return StrategyExecutionResult::succeeded(changes, iterations, tokens_used, cost_usd);
            }
            errors = validation.errors;
        }

        StrategyExecutionResult::failed("max iterations exceeded", errors, iterations, tokens_used, cost_usd)
    }

    fn name(&self) -> &'static str {
        STRATEGY_ITERATIVE
    }
}
