//! SQLite-backed [`TaskStore`].
//!
//! All blocking SQLite work runs on the Tokio blocking pool via
//! [`tokio::task::spawn_blocking`]; the public API is entirely `async fn`.
//! A single [`std::sync::Mutex`]-guarded [`rusqlite::Connection`] is shared
//! across tasks, which is sufficient for the write volumes this service
//! sees (SQLite itself serializes writers) and keeps the store free of an
//! external database dependency.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::ids::{ChangeSetId, ExecutionId, OutboxId, TaskId, now_ms};
use crate::model::{
    ChangeSet, ChangeType, Classification, ClassificationSource, Complexity, Execution, ExecutionStatus,
    FileChange, IterationRecord, OutboxKind, OutboxMessage, Priority, Task, TaskStatus, TaskType,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    user_id TEXT NOT NULL,
    type_hint TEXT,
    override_strategy TEXT,
    priority INTEGER NOT NULL DEFAULT 1,
    client_token TEXT,
    status TEXT NOT NULL,
    class_task_type TEXT,
    class_complexity TEXT,
    class_confidence REAL,
    class_source TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_tasks_status_updated ON tasks(status, updated_at);
CREATE INDEX IF NOT EXISTS idx_tasks_client_token ON tasks(client_token);

CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES tasks(id),
    strategy TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    iterations_used INTEGER NOT NULL DEFAULT 0,
    tokens_used INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0,
    failure_reason TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_executions_one_running
    ON executions(task_id) WHERE status = 'running';
CREATE INDEX IF NOT EXISTS idx_executions_task ON executions(task_id);

CREATE TABLE IF NOT EXISTS iteration_records (
    execution_id TEXT NOT NULL REFERENCES executions(id),
    idx INTEGER NOT NULL,
    prompt_length INTEGER NOT NULL,
    tokens_used INTEGER NOT NULL,
    cost_usd REAL NOT NULL,
    validation_error_count INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    PRIMARY KEY (execution_id, idx)
);

CREATE TABLE IF NOT EXISTS change_sets (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL UNIQUE REFERENCES executions(id),
    files_changed INTEGER NOT NULL,
    lines_added INTEGER NOT NULL,
    lines_removed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS file_changes (
    change_set_id TEXT NOT NULL REFERENCES change_sets(id),
    ord INTEGER NOT NULL,
    path TEXT NOT NULL,
    language TEXT,
    change_type TEXT NOT NULL,
    content TEXT NOT NULL,
    PRIMARY KEY (change_set_id, ord)
);

CREATE TABLE IF NOT EXISTS outbox_messages (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES tasks(id),
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    delivered_at INTEGER,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    next_attempt_at INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_outbox_undelivered ON outbox_messages(delivered_at) WHERE delivered_at IS NULL;

CREATE TABLE IF NOT EXISTS publisher_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    owner TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
"#;

/// Transactional SQLite-backed store for tasks, executions, change sets,
/// iteration records and the event outbox.
#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    /// Open (creating if needed) a store at `path`, running migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .expect("spawn_blocking panicked")?;
        info!("taskstore opened and migrated");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("taskstore connection poisoned");
            f(&guard)
        })
        .await
        .expect("spawn_blocking panicked")
    }

    // ---- Task CRUD ----------------------------------------------------

    pub async fn create_task(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, description, user_id, type_hint, override_strategy, priority,
                    client_token, status, class_task_type, class_complexity, class_confidence, class_source,
                    created_at, updated_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    task.id,
                    task.title,
                    task.description,
                    task.user_id,
                    task.type_hint.map(|t| t.as_str()),
                    task.override_strategy,
                    task.priority.0,
                    task.client_token,
                    task.status.as_str(),
                    task.classification.as_ref().map(|c| c.task_type.as_str()),
                    task.classification.as_ref().map(|c| c.complexity.as_str()),
                    task.classification.as_ref().map(|c| c.confidence),
                    task.classification.as_ref().map(|c| c.source.as_str()),
                    task.created_at,
                    task.updated_at,
                    task.started_at,
                    task.completed_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Look up a task created with `token` within the idempotency window
    /// (`since_ms`, a Unix-ms cutoff), for submission idempotence.
    pub async fn find_by_client_token(&self, token: &str, since_ms: i64) -> Result<Option<Task>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE client_token = ?1 AND created_at >= ?2 ORDER BY created_at DESC LIMIT 1",
            )?;
            stmt.query_row(params![token, since_ms], row_to_task)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
                .optional()?
                .ok_or(StoreError::TaskNotFound(id))
        })
        .await
    }

    pub async fn try_get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    /// Compare-and-set on task status. Returns `Ok(())` on success,
    /// `Err(StoreError::CasMismatch)` if another owner already moved the
    /// task, and `Err(StoreError::IllegalTransition)` if `new` would move
    /// status backward relative to `expected`.
    pub async fn cas_task_status(&self, id: TaskId, expected: TaskStatus, new: TaskStatus) -> Result<()> {
        self.with_conn(move |conn| {
            let current: String = conn.query_row("SELECT status FROM tasks WHERE id = ?1", params![id], |r| {
                r.get(0)
            })?;
            let current = TaskStatus::parse(&current).expect("stored status is always valid");
            if current != expected {
                return Err(StoreError::CasMismatch {
                    task: id,
                    expected,
                    found: current,
                });
            }
            if !current.can_transition_to(new) {
                return Err(StoreError::IllegalTransition {
                    task: id,
                    from: current,
                    to: new,
                });
            }
            let n = conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![new.as_str(), now_ms(), id, expected.as_str()],
            )?;
            if n == 0 {
                return Err(StoreError::CasMismatch {
                    task: id,
                    expected,
                    found: current,
                });
            }
            debug!(%id, ?expected, ?new, "cas_task_status applied");
            Ok(())
        })
        .await
    }

    /// Record the classification decision (set exactly once while leaving
    /// `Classifying`).
    pub async fn set_classification(&self, id: TaskId, classification: Classification) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tasks SET class_task_type = ?1, class_complexity = ?2, class_confidence = ?3,
                    class_source = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    classification.task_type.as_str(),
                    classification.complexity.as_str(),
                    classification.confidence,
                    classification.source.as_str(),
                    now_ms(),
                    id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Tasks in `status` whose `updated_at` is older than `older_than_ms`,
    /// used by the reaper to find stuck tasks.
    pub async fn find_stale(&self, status: TaskStatus, older_than_ms: i64) -> Result<Vec<Task>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM tasks WHERE status = ?1 AND updated_at < ?2")?;
            let rows = stmt
                .query_map(params![status.as_str(), older_than_ms], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Count of tasks currently in `status`, used by callers enforcing
    /// worker-pool backpressure without pulling the full row set.
    pub async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        self.with_conn(move |conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM tasks WHERE status = ?1", params![status.as_str()], |r| r.get(0))?;
            Ok(count)
        })
        .await
    }

    /// Count of undelivered outbox rows, used to detect a publisher
    /// backlog for backpressure purposes.
    pub async fn count_outbox_backlog(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM outbox_messages WHERE delivered_at IS NULL", [], |r| r.get(0))?;
            Ok(count)
        })
        .await
    }

    // ---- Execution ------------------------------------------------------

    /// Atomically transition the task `Classifying -> Executing` and insert
    /// the new `Running` execution row (step 4 of the executor lifecycle).
    pub async fn start_execution(&self, task_id: TaskId, execution: &Execution) -> Result<()> {
        let execution = execution.clone();
        self.with_conn(move |conn| {
            let current: String =
                conn.query_row("SELECT status FROM tasks WHERE id = ?1", params![task_id], |r| r.get(0))?;
            let current = TaskStatus::parse(&current).expect("stored status is always valid");
            if current != TaskStatus::Classifying {
                return Err(StoreError::CasMismatch {
                    task: task_id,
                    expected: TaskStatus::Classifying,
                    found: current,
                });
            }
            let running: i64 = conn.query_row(
                "SELECT COUNT(*) FROM executions WHERE task_id = ?1 AND status = 'running'",
                params![task_id],
                |r| r.get(0),
            )?;
            if running > 0 {
                return Err(StoreError::AlreadyRunning(task_id));
            }
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO executions (id, task_id, strategy, status, started_at, finished_at,
                    iterations_used, tokens_used, cost_usd, failure_reason)
                 VALUES (?1, ?2, ?3, 'running', ?4, NULL, 0, 0, 0, NULL)",
                params![execution.id, task_id, execution.strategy, execution.started_at],
            )?;
            tx.execute(
                "UPDATE tasks SET status = 'executing', started_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![now_ms(), task_id],
            )?;
            tx.commit()?;
            debug!(%task_id, execution = %execution.id, "execution started");
            Ok(())
        })
        .await
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<Execution> {
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM executions WHERE id = ?1", params![id], row_to_execution)
                .optional()?
                .ok_or(StoreError::ExecutionNotFound(id))
        })
        .await
    }

    pub async fn list_executions_for_task(&self, task_id: TaskId) -> Result<Vec<Execution>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM executions WHERE task_id = ?1 ORDER BY started_at ASC")?;
            let rows = stmt
                .query_map(params![task_id], row_to_execution)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn record_iteration(&self, record: IterationRecord) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO iteration_records (execution_id, idx, prompt_length, tokens_used, cost_usd,
                    validation_error_count, duration_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.execution_id,
                    record.index,
                    record.prompt_length,
                    record.tokens_used as i64,
                    record.cost_usd,
                    record.validation_error_count,
                    record.duration_ms as i64,
                ],
            )?;
            conn.execute(
                "UPDATE executions SET iterations_used = iterations_used + 1,
                    tokens_used = tokens_used + ?1, cost_usd = cost_usd + ?2 WHERE id = ?3",
                params![record.tokens_used as i64, record.cost_usd, record.execution_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_iterations(&self, execution_id: ExecutionId) -> Result<Vec<IterationRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id, idx, prompt_length, tokens_used, cost_usd, validation_error_count, duration_ms
                 FROM iteration_records WHERE execution_id = ?1 ORDER BY idx ASC",
            )?;
            let rows = stmt
                .query_map(params![execution_id], |r| {
                    Ok(IterationRecord {
                        execution_id: r.get(0)?,
                        index: r.get(1)?,
                        prompt_length: r.get(2)?,
                        tokens_used: r.get::<_, i64>(3)? as u64,
                        cost_usd: r.get(4)?,
                        validation_error_count: r.get(5)?,
                        duration_ms: r.get::<_, i64>(6)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Atomically seal the execution's terminal status, write the change
    /// set (only when `status == Succeeded`), set the task's terminal
    /// status, and insert the outbox row. This is §4.9 step 7 and must
    /// never partially apply.
    pub async fn finalize(
        &self,
        execution_id: ExecutionId,
        execution_status: ExecutionStatus,
        failure_reason: Option<String>,
        change_set: Option<ChangeSet>,
        task_id: TaskId,
        task_status: TaskStatus,
        outbox_kind: OutboxKind,
        outbox_payload: String,
    ) -> Result<OutboxId> {
        if let Some(cs) = &change_set {
            if !cs.has_unique_paths() {
                return Err(StoreError::DuplicateChangeSetPaths(execution_id));
            }
            if execution_status != ExecutionStatus::Succeeded {
                return Err(StoreError::ChangeSetRequiresSucceeded(execution_id));
            }
        }
        if !task_status.is_terminal() {
            return Err(StoreError::IllegalTransition {
                task: task_id,
                from: task_status,
                to: task_status,
            });
        }
        let outbox_id = OutboxId::new();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let now = now_ms();
            tx.execute(
                "UPDATE executions SET status = ?1, finished_at = ?2, failure_reason = ?3 WHERE id = ?4",
                params![execution_status.as_str(), now, failure_reason, execution_id],
            )?;
            if let Some(cs) = &change_set {
                tx.execute(
                    "INSERT INTO change_sets (id, execution_id, files_changed, lines_added, lines_removed)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![cs.id, cs.execution_id, cs.files_changed, cs.lines_added as i64, cs.lines_removed as i64],
                )?;
                for (ord, f) in cs.files.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO file_changes (change_set_id, ord, path, language, change_type, content)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![cs.id, ord as i64, f.path, f.language, f.change_type.as_str(), f.content],
                    )?;
                }
            }
            let current: String =
                tx.query_row("SELECT status FROM tasks WHERE id = ?1", params![task_id], |r| r.get(0))?;
            let current = TaskStatus::parse(&current).expect("stored status is always valid");
            if !current.can_transition_to(task_status) && current != task_status {
                return Err(StoreError::IllegalTransition {
                    task: task_id,
                    from: current,
                    to: task_status,
                });
            }
            tx.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2, completed_at = ?2 WHERE id = ?3",
                params![task_status.as_str(), now, task_id],
            )?;
            tx.execute(
                "INSERT INTO outbox_messages (id, task_id, kind, payload, created_at, attempt_count, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?5)",
                params![outbox_id, task_id, outbox_kind.as_str(), outbox_payload, now],
            )?;
            tx.commit()?;
            info!(%task_id, %execution_id, ?task_status, "task finalized");
            Ok(())
        })
        .await?;
        Ok(outbox_id)
    }

    pub async fn get_change_set_for_execution(&self, execution_id: ExecutionId) -> Result<Option<ChangeSet>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, execution_id, files_changed, lines_added, lines_removed
                     FROM change_sets WHERE execution_id = ?1",
                    params![execution_id],
                    |r| {
                        Ok((
                            r.get::<_, ChangeSetId>(0)?,
                            r.get::<_, ExecutionId>(1)?,
                            r.get::<_, u32>(2)?,
                            r.get::<_, i64>(3)? as u64,
                            r.get::<_, i64>(4)? as u64,
                        ))
                    },
                )
                .optional()?;
            let Some((id, execution_id, files_changed, lines_added, lines_removed)) = row else {
                return Ok(None);
            };
            let mut stmt = conn.prepare(
                "SELECT path, language, change_type, content FROM file_changes
                 WHERE change_set_id = ?1 ORDER BY ord ASC",
            )?;
            let files = stmt
                .query_map(params![id], |r| {
                    let change_type: String = r.get(2)?;
                    Ok(FileChange {
                        path: r.get(0)?,
                        language: r.get(1)?,
                        change_type: ChangeType::parse(&change_type).unwrap_or(ChangeType::Modify),
                        content: r.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Some(ChangeSet {
                id,
                execution_id,
                files,
                files_changed,
                lines_added,
                lines_removed,
            }))
        })
        .await
    }

    // ---- Outbox ---------------------------------------------------------

    pub async fn fetch_outbox_batch(&self, limit: u32) -> Result<Vec<OutboxMessage>> {
        let now = now_ms();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, kind, payload, created_at, delivered_at, attempt_count
                 FROM outbox_messages
                 WHERE delivered_at IS NULL AND next_attempt_at <= ?1
                 ORDER BY created_at ASC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![now, limit], |r| {
                    let kind: String = r.get(2)?;
                    Ok(OutboxMessage {
                        id: r.get(0)?,
                        task_id: r.get(1)?,
                        kind: OutboxKind::parse(&kind).unwrap_or(OutboxKind::TaskFailed),
                        payload: r.get(3)?,
                        created_at: r.get(4)?,
                        delivered_at: r.get(5)?,
                        attempt_count: r.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn mark_outbox_delivered(&self, id: OutboxId) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM outbox_messages WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
    }

    /// Bump `attempt_count` and schedule the next attempt at `next_attempt_at`
    /// (caller computes the exponential-backoff delay).
    pub async fn reschedule_outbox(&self, id: OutboxId, next_attempt_at: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE outbox_messages SET attempt_count = attempt_count + 1, next_attempt_at = ?1 WHERE id = ?2",
                params![next_attempt_at, id],
            )?;
            Ok(())
        })
        .await
    }

    // ---- Publisher lease --------------------------------------------------

    /// Attempt to acquire (or renew, if already held by `owner`) the
    /// singleton publisher lease. Returns whether the lease is now held.
    pub async fn acquire_lease(&self, owner: &str, ttl_ms: i64) -> Result<bool> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let now = now_ms();
            let expires_at = now + ttl_ms;
            let existing: Option<(String, i64)> = conn
                .query_row("SELECT owner, expires_at FROM publisher_lease WHERE id = 1", [], |r| {
                    Ok((r.get(0)?, r.get(1)?))
                })
                .optional()?;
            match existing {
                None => {
                    conn.execute(
                        "INSERT INTO publisher_lease (id, owner, expires_at) VALUES (1, ?1, ?2)",
                        params![owner, expires_at],
                    )?;
                    Ok(true)
                }
                Some((current_owner, current_expiry)) if current_owner == owner || current_expiry < now => {
                    conn.execute(
                        "UPDATE publisher_lease SET owner = ?1, expires_at = ?2 WHERE id = 1",
                        params![owner, expires_at],
                    )?;
                    Ok(true)
                }
                Some(_) => {
                    warn!("publisher lease held by another owner");
                    Ok(false)
                }
            }
        })
        .await
    }

    pub async fn release_lease(&self, owner: &str) -> Result<()> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM publisher_lease WHERE id = 1 AND owner = ?1", params![owner])?;
            Ok(())
        })
        .await
    }

    // ---- Reaper helpers -----------------------------------------------

    /// Seal an abandoned `Executing` task: its running execution becomes
    /// `Failed` with `abandoned`, and the task is marked `Failed`, with an
    /// outbox row so downstream consumers still hear about it.
    pub async fn reap_executing(&self, task_id: TaskId) -> Result<Option<OutboxId>> {
        let execution: Option<ExecutionId> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id FROM executions WHERE task_id = ?1 AND status = 'running'",
                    params![task_id],
                    |r| r.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;
        let Some(execution_id) = execution else {
            return Ok(None);
        };
        let payload = serde_json::json!({
            "task_id": task_id.to_string(),
            "execution_id": execution_id.to_string(),
            "reason": "abandoned",
            "occurred_at": now_ms(),
        })
        .to_string();
        let id = self
            .finalize(
                execution_id,
                ExecutionStatus::Failed,
                Some("abandoned".to_string()),
                None,
                task_id,
                TaskStatus::Failed,
                OutboxKind::TaskFailed,
                payload,
            )
            .await?;
        Ok(Some(id))
    }

    /// Reset a task stuck in `Classifying` (no execution row exists yet)
    /// back to `Pending` so a worker can retry it.
    pub async fn reset_classifying_to_pending(&self, task_id: TaskId) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tasks SET status = 'pending', updated_at = ?1 WHERE id = ?2 AND status = 'classifying'",
                params![now_ms(), task_id],
            )?;
            Ok(())
        })
        .await
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: u8 = row.get("priority")?;
    let type_hint: Option<String> = row.get("type_hint")?;
    let class_task_type: Option<String> = row.get("class_task_type")?;
    let class_complexity: Option<String> = row.get("class_complexity")?;
    let class_confidence: Option<f32> = row.get("class_confidence")?;
    let class_source: Option<String> = row.get("class_source")?;

    let classification = match (class_task_type, class_complexity, class_confidence, class_source) {
        (Some(t), Some(c), Some(conf), Some(s)) => Some(Classification {
            task_type: TaskType::parse(&t).unwrap_or(TaskType::Other),
            complexity: Complexity::parse(&c).unwrap_or(Complexity::Medium),
            confidence: conf,
            source: ClassificationSource::parse(&s).unwrap_or(ClassificationSource::Heuristic),
        }),
        _ => None,
    };

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        user_id: row.get("user_id")?,
        type_hint: type_hint.and_then(|t| TaskType::parse(&t)),
        override_strategy: row.get("override_strategy")?,
        priority: Priority::clamp(priority),
        client_token: row.get("client_token")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Pending),
        classification,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    let status: String = row.get("status")?;
    Ok(Execution {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        strategy: row.get("strategy")?,
        status: ExecutionStatus::parse(&status).unwrap_or(ExecutionStatus::Failed),
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        iterations_used: row.get("iterations_used")?,
        tokens_used: row.get::<_, i64>("tokens_used")? as u64,
        cost_usd: row.get("cost_usd")?,
        failure_reason: row.get("failure_reason")?,
    })
}
