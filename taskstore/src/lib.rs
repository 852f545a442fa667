//! Transactional SQLite-backed persistence for tasks, executions, change
//! sets and the event outbox.
//!
//! This crate owns the durable state of the orchestration core: every
//! status transition goes through a compare-and-swap, and the terminal
//! commit of an execution (status + change set + task status + outbox row)
//! happens in one SQLite transaction so a crash can never leave a task
//! "succeeded" without its change set, or "done" without a queued event.

pub mod error;
pub mod ids;
pub mod model;
pub mod store;

pub use error::{Result, StoreError};
pub use ids::{ChangeSetId, ExecutionId, OutboxId, TaskId};
pub use model::{
    ChangeSet, ChangeType, Classification, ClassificationSource, Complexity, Execution, ExecutionStatus,
    FileChange, IterationRecord, OutboxKind, OutboxMessage, Priority, Task, TaskStatus, TaskType,
};
pub use store::TaskStore;
