//! Canonical event payloads emitted on every terminal transition (§6).

use serde::{Deserialize, Serialize};

use taskstore::{ExecutionId, TaskId};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSucceeded {
    pub event_id: String,
    pub schema_version: u32,
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub strategy: String,
    pub iterations: u32,
    pub tokens: u64,
    pub cost_usd: f64,
    pub files_changed: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub changeset_id: String,
    pub occurred_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailed {
    pub event_id: String,
    pub schema_version: u32,
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub strategy: String,
    pub iterations: u32,
    pub tokens: u64,
    pub cost_usd: f64,
    pub reason: String,
    pub errors: Vec<String>,
    pub occurred_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTimedOut {
    pub event_id: String,
    pub schema_version: u32,
    pub task_id: TaskId,
    pub execution_id: Option<ExecutionId>,
    pub elapsed_ms: u64,
    pub occurred_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCancelled {
    pub event_id: String,
    pub schema_version: u32,
    pub task_id: TaskId,
    pub execution_id: Option<ExecutionId>,
    pub occurred_at: i64,
}
