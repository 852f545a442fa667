//! SingleShot strategy (L5): one LLM call, one validation.

use async_trait::async_trait;
use tracing::{debug, warn};

use taskstore::Task;

use crate::llm::{CompletionRequest, LlmError, Message};
use crate::parser;

use super::{build_user_prompt, Strategy, StrategyContext, StrategyExecutionResult, STRATEGY_SINGLE_SHOT, SYSTEM_PROMPT};

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 4000;

pub struct SingleShotStrategy;

#[async_trait]
impl Strategy for SingleShotStrategy {
    async fn execute(&self, task: &Task, ctx: &StrategyContext) -> StrategyExecutionResult {
        debug!(task_id = %task.id, "single_shot: executing");

        let request = CompletionRequest {
            model_id: ctx.model_id.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(build_user_prompt(task, ctx, &[]))],
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        };

        let response = match ctx.llm.generate(request, ctx.remaining()).await {
            Ok(r) => r,
            Err(LlmError::DeadlineExceeded) => {
                warn!(task_id = %task.id, "single_shot: llm call exceeded its deadline");
                return StrategyExecutionResult::timed_out(Vec::new(), 0, 0.0);
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "single_shot: llm call failed");
                return StrategyExecutionResult::failed(e.to_string(), vec![e.to_string()], Vec::new(), 0, 0.0);
            }
        };

        let tokens_used = response.tokens_used();
        let cost_usd = response.cost_usd;

        let changes = parser::parse(&response.content);
        if changes.is_empty() {
            return StrategyExecutionResult::failed("no parseable changes", Vec::new(), Vec::new(), tokens_used, cost_usd);
        }

        if ctx.cancel.is_cancelled() {
            return StrategyExecutionResult::cancelled(Vec::new(), tokens_used, cost_usd);
        }

        let validation = ctx.validator.validate(&changes).await;
        if !validation.ok {
            return StrategyExecutionResult::failed(
                "validation failed",
                validation.errors,
                Vec::new(),
                tokens_used,
                cost_usd,
            );
        }

        StrategyExecutionResult::succeeded(changes, Vec::new(), tokens_used, cost_usd)
    }

    fn name(&self) -> &'static str {
        STRATEGY_SINGLE_SHOT
    }
}
