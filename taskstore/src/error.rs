//! Store error types.

use thiserror::Error;

use crate::ids::{ExecutionId, TaskId};
use crate::model::TaskStatus;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),

    #[error("cas on task {task} failed: expected {expected:?}, found {found:?}")]
    CasMismatch {
        task: TaskId,
        expected: TaskStatus,
        found: TaskStatus,
    },

    #[error("illegal task status transition on {task}: {from:?} -> {to:?}")]
    IllegalTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {0} already has a running execution")]
    AlreadyRunning(TaskId),

    #[error("change set paths are not unique for execution {0}")]
    DuplicateChangeSetPaths(ExecutionId),

    #[error("a change set may only be written for a succeeded execution, execution {0} is not")]
    ChangeSetRequiresSucceeded(ExecutionId),
}

pub type Result<T> = std::result::Result<T, StoreError>;
