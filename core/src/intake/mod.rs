//! Intake Service (L12): validates task submissions and inserts the
//! `Pending` row. No business logic beyond validation and persistence.

use thiserror::Error;

use taskstore::{Priority, Task, TaskId, TaskStore, TaskType};

use crate::strategy::selector::KNOWN_STRATEGIES;

pub const MAX_DESCRIPTION_BYTES: usize = 32 * 1024;
const IDEMPOTENCY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("description exceeds {MAX_DESCRIPTION_BYTES} bytes")]
    DescriptionTooLarge,
    #[error("unknown override strategy '{0}'")]
    UnknownOverrideStrategy(String),
    #[error("worker pool saturated or outbox backlog too deep, retry later")]
    Overloaded,
}

/// Caller-supplied fields for `SubmitTask` (§6).
#[derive(Debug, Clone)]
pub struct SubmitTaskRequest {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub type_hint: Option<TaskType>,
    pub override_strategy: Option<String>,
    pub priority: Option<Priority>,
    pub client_token: Option<String>,
}

fn validate(request: &SubmitTaskRequest) -> Result<(), IntakeError> {
    if request.title.trim().is_empty() {
        return Err(IntakeError::EmptyTitle);
    }
    if request.description.len() > MAX_DESCRIPTION_BYTES {
        return Err(IntakeError::DescriptionTooLarge);
    }
    if let Some(name) = &request.override_strategy {
        if !KNOWN_STRATEGIES.contains(&name.as_str()) {
            return Err(IntakeError::UnknownOverrideStrategy(name.clone()));
        }
    }
    Ok(())
}

pub struct IntakeService {
    store: TaskStore,
    worker_pool_size: i64,
    outbox_backlog_watermark: i64,
}

impl IntakeService {
    pub fn new(store: TaskStore, worker_pool_size: usize, outbox_backlog_watermark: i64) -> Self {
        Self {
            store,
            worker_pool_size: worker_pool_size as i64,
            outbox_backlog_watermark,
        }
    }

    /// Validate and persist a submission, returning the existing task
    /// instead of inserting a duplicate when `client_token` matches one
    /// submitted within the last 24 hours.
    ///
    /// Rejects with `Overloaded` when every worker slot is already busy
    /// classifying or executing a task, or when the outbox has backed up
    /// past its watermark (§5 "Backpressure") — in both cases the caller
    /// should retry rather than have the submission silently queue behind
    /// an unbounded backlog.
    pub async fn submit(&self, request: SubmitTaskRequest) -> eyre::Result<TaskId> {
        validate(&request).map_err(eyre::Report::from)?;

        let in_flight = self.store.count_by_status(taskstore::TaskStatus::Classifying).await?
            + self.store.count_by_status(taskstore::TaskStatus::Executing).await?;
        if in_flight >= self.worker_pool_size {
            return Err(IntakeError::Overloaded.into());
        }
        if self.store.count_outbox_backlog().await? >= self.outbox_backlog_watermark {
            return Err(IntakeError::Overloaded.into());
        }

        if let Some(token) = &request.client_token {
            let since = taskstore::ids::now_ms() - IDEMPOTENCY_WINDOW_MS;
            if let Some(existing) = self.store.find_by_client_token(token, since).await? {
                return Ok(existing.id);
            }
        }

        let mut task = Task::new(request.user_id, request.title, request.description);
        task.type_hint = request.type_hint;
        task.override_strategy = request.override_strategy;
        task.priority = request.priority.unwrap_or(Priority::NORMAL);
        task.client_token = request.client_token;

        self.store.create_task(&task).await?;
        Ok(task.id)
    }

    pub async fn get(&self, id: TaskId) -> eyre::Result<Option<Task>> {
        Ok(self.store.try_get_task(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, description: &str) -> SubmitTaskRequest {
        SubmitTaskRequest {
            user_id: "user-1".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            type_hint: None,
            override_strategy: None,
            priority: None,
            client_token: None,
        }
    }

    #[tokio::test]
    async fn submits_and_reads_back_a_task() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store, 16, 1000);
        let id = intake.submit(request("Fix bug", "short description")).await.unwrap();
        let task = intake.get(id).await.unwrap().unwrap();
        assert_eq!(task.title, "Fix bug");
        assert_eq!(task.status, taskstore::TaskStatus::Pending);
    }

    #[tokio::test]
    async fn rejects_empty_title() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store, 16, 1000);
        let err = intake.submit(request("", "d")).await.unwrap_err();
        assert!(err.to_string().contains("title must not be empty"));
    }

    #[tokio::test]
    async fn rejects_oversize_description() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store, 16, 1000);
        let huge = "a".repeat(MAX_DESCRIPTION_BYTES + 1);
        let err = intake.submit(request("t", &huge)).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[tokio::test]
    async fn rejects_unknown_override_strategy() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store, 16, 1000);
        let mut req = request("t", "d");
        req.override_strategy = Some("NotReal".to_string());
        let err = intake.submit(req).await.unwrap_err();
        assert!(err.to_string().contains("unknown override strategy"));
    }

    #[tokio::test]
    async fn rejects_submission_when_worker_pool_saturated() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store.clone(), 1, 1000);
        let mut busy = Task::new("user-1".to_string(), "t".to_string(), "d".to_string());
        busy.status = taskstore::TaskStatus::Executing;
        store.create_task(&busy).await.unwrap();

        let err = intake.submit(request("t2", "d2")).await.unwrap_err();
        assert!(err.to_string().contains("Overloaded") || err.downcast_ref::<IntakeError>() == Some(&IntakeError::Overloaded));
    }

    #[tokio::test]
    async fn client_token_dedupes_within_window() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let intake = IntakeService::new(store, 16, 1000);
        let mut req = request("t", "d");
        req.client_token = Some("tok-1".to_string());
        let id1 = intake.submit(req.clone()).await.unwrap();
        let id2 = intake.submit(req).await.unwrap();
        assert_eq!(id1, id2);
    }
}
