//! Domain entities persisted by the [`TaskStore`](crate::TaskStore).
//!
//! These mirror the data model in section 3 of the orchestration spec one
//! for one; the store is responsible for enforcing the invariants, these
//! types just carry the data.

use serde::{Deserialize, Serialize};

use crate::ids::{ChangeSetId, ExecutionId, OutboxId, TaskId};

/// Status of a [`Task`], following the state machine:
/// `Pending -> Classifying -> Executing -> {Succeeded, Failed, Cancelled, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Classifying,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    /// Encode to the string stored in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Classifying => "classifying",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "classifying" => Self::Classifying,
            "executing" => Self::Executing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "timed_out" => Self::TimedOut,
            _ => return None,
        })
    }

    /// Whether `self -> next` is a legal forward transition in the state
    /// machine (never backward, terminal states have no successor).
    pub fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Classifying)
                | (Classifying, Executing)
                | (Classifying, Failed)
                | (Pending, Pending)
                | (Classifying, Classifying)
                | (Executing, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
                | (Executing, Cancelled)
                | (Executing, TimedOut)
                | (Pending, Cancelled)
                | (Classifying, Cancelled)
        )
    }
}

/// Optional hint about the kind of change a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    BugFix,
    Feature,
    Refactor,
    Other,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BugFix => "bug-fix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "bug-fix" => Self::BugFix,
            "feature" => Self::Feature,
            "refactor" => Self::Refactor,
            "other" => Self::Other,
            _ => return None,
        })
    }
}

/// Complexity band produced by classification; governs strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    Epic,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Epic => "epic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "simple" => Self::Simple,
            "medium" => Self::Medium,
            "complex" => Self::Complex,
            "epic" => Self::Epic,
            _ => return None,
        })
    }
}

/// Where a classification decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Ml,
    Heuristic,
    Override,
}

impl ClassificationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ml => "ml",
            Self::Heuristic => "heuristic",
            Self::Override => "override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "ml" => Self::Ml,
            "heuristic" => Self::Heuristic,
            "override" => Self::Override,
            _ => return None,
        })
    }
}

/// Priority band, 0 (lowest) to 3 (highest), matching the spec's `0-3` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Priority(pub u8);

impl Priority {
    pub const LOW: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const CRITICAL: Priority = Priority(3);

    pub fn clamp(value: u8) -> Self {
        Priority(value.min(3))
    }
}

/// A task's classification, set exactly once when leaving `Classifying`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub confidence: f32,
    pub source: ClassificationSource,
}

/// An intent to change code, submitted to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub user_id: String,
    pub type_hint: Option<TaskType>,
    pub override_strategy: Option<String>,
    pub priority: Priority,
    pub client_token: Option<String>,
    pub status: TaskStatus,
    pub classification: Option<Classification>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = crate::ids::now_ms();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: description.into(),
            user_id: user_id.into(),
            type_hint: None,
            override_strategy: None,
            priority: Priority::NORMAL,
            client_token: None,
            status: TaskStatus::Pending,
            classification: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Status of an [`Execution`], a single attempt at fulfilling a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "timed_out" => Self::TimedOut,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}

/// A single attempt at carrying out a task via a chosen strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub task_id: TaskId,
    pub strategy: String,
    pub status: ExecutionStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub failure_reason: Option<String>,
}

impl Execution {
    pub fn new(task_id: TaskId, strategy: impl Into<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            task_id,
            strategy: strategy.into(),
            status: ExecutionStatus::Running,
            started_at: crate::ids::now_ms(),
            finished_at: None,
            iterations_used: 0,
            tokens_used: 0,
            cost_usd: 0.0,
            failure_reason: None,
        }
    }
}

/// Kind of change a [`FileChange`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create" => Self::Create,
            "modify" => Self::Modify,
            "delete" => Self::Delete,
            _ => return None,
        })
    }
}

/// One file-level edit produced by a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub language: Option<String>,
    pub change_type: ChangeType,
    pub content: String,
}

/// The artifact produced by a successful execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: ChangeSetId,
    pub execution_id: ExecutionId,
    pub files: Vec<FileChange>,
    pub files_changed: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl ChangeSet {
    /// Build a ChangeSet from its files, computing the counted metrics.
    /// Panics (via debug_assert) are avoided; duplicate-path validation is
    /// the caller's job (`TaskStore::finalize` enforces it before insert).
    pub fn from_files(execution_id: ExecutionId, files: Vec<FileChange>) -> Self {
        let files_changed = files.len() as u32;
        let mut lines_added = 0u64;
        let mut lines_removed = 0u64;
        for f in &files {
            match f.change_type {
                ChangeType::Create => lines_added += f.content.lines().count() as u64,
                ChangeType::Delete => lines_removed += f.content.lines().count() as u64,
                ChangeType::Modify => lines_added += f.content.lines().count() as u64,
            }
        }
        Self {
            id: ChangeSetId::new(),
            execution_id,
            files,
            files_changed,
            lines_added,
            lines_removed,
        }
    }

    pub fn has_unique_paths(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.files.iter().all(|f| seen.insert(f.path.as_str()))
    }
}

/// Per-iteration diagnostic recorded by the Iterative and MultiAgent
/// strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub execution_id: ExecutionId,
    pub index: u32,
    pub prompt_length: u32,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub validation_error_count: u32,
    pub duration_ms: u64,
}

/// Kind of domain event queued in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    TaskTimedOut,
}

impl OutboxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskCancelled => "task_cancelled",
            Self::TaskTimedOut => "task_timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "task_completed" => Self::TaskCompleted,
            "task_failed" => Self::TaskFailed,
            "task_cancelled" => Self::TaskCancelled,
            "task_timed_out" => Self::TaskTimedOut,
            _ => return None,
        })
    }
}

/// A pending domain event, co-committed with the task's terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub task_id: TaskId,
    pub kind: OutboxKind,
    pub payload: String,
    pub created_at: i64,
    pub delivered_at: Option<i64>,
    pub attempt_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_is_monotone() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Classifying));
        assert!(TaskStatus::Classifying.can_transition_to(TaskStatus::Executing));
        assert!(TaskStatus::Executing.can_transition_to(TaskStatus::Succeeded));
        assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Executing.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn terminal_statuses_have_no_successor() {
        for terminal in [
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::TimedOut,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(TaskStatus::Pending));
        }
    }

    #[test]
    fn changeset_computes_metrics() {
        let exec_id = ExecutionId::new();
        let files = vec![FileChange {
            path: "a.rs".into(),
            language: Some("rust".into()),
            change_type: ChangeType::Modify,
            content: "line1\nline2\n".into(),
        }];
        let cs = ChangeSet::from_files(exec_id, files);
        assert_eq!(cs.files_changed, 1);
        assert_eq!(cs.lines_added, 2);
        assert!(cs.has_unique_paths());
    }

    #[test]
    fn changeset_detects_duplicate_paths() {
        let exec_id = ExecutionId::new();
        let files = vec![
            FileChange {
                path: "a.rs".into(),
                language: None,
                change_type: ChangeType::Modify,
                content: "x".into(),
            },
            FileChange {
                path: "a.rs".into(),
                language: None,
                change_type: ChangeType::Modify,
                content: "y".into(),
            },
        ];
        let cs = ChangeSet::from_files(exec_id, files);
        assert!(!cs.has_unique_paths());
    }

    #[test]
    fn status_string_round_trips() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Classifying,
            TaskStatus::Executing,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::TimedOut,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()), Some(s));
        }
    }
}
