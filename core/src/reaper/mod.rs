//! Reaper (§4.14, supplemented): background sweep for tasks stuck in
//! `Classifying` or `Executing` with no live owning worker.

use std::time::Duration;

use tracing::{info, warn};

use taskstore::{ids::now_ms, TaskStatus, TaskStore};

use crate::config::ReaperConfig;

pub struct Reaper {
    store: TaskStore,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(store: TaskStore, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep: reset stale `Classifying` rows to `Pending`, and seal
    /// stale `Executing` rows as abandoned `Failed` executions.
    pub async fn sweep_once(&self) -> eyre::Result<usize> {
        let cutoff = now_ms() - self.config.stale_window_sec * 1000;
        let mut reaped = 0;

        for task in self.store.find_stale(TaskStatus::Classifying, cutoff).await? {
            self.store.reset_classifying_to_pending(task.id).await?;
            info!(task_id = %task.id, "reaper: reset stuck classifying task to pending");
            reaped += 1;
        }

        for task in self.store.find_stale(TaskStatus::Executing, cutoff).await? {
            match self.store.reap_executing(task.id).await? {
                Some(_) => {
                    warn!(task_id = %task.id, "reaper: sealed abandoned executing task");
                    reaped += 1;
                }
                None => {
                    // no running execution to seal; nothing to do here, a
                    // concurrent worker likely already finalized it.
                }
            }
        }

        Ok(reaped)
    }

    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.scan_interval_sec));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "reaper: sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reaper: shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskstore::{Execution, Task};

    #[tokio::test]
    async fn resets_stuck_classifying_tasks() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let task = Task::new("u", "t", "d");
        store.create_task(&task).await.unwrap();
        store.cas_task_status(task.id, TaskStatus::Pending, TaskStatus::Classifying).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig { stale_window_sec: -1, ..ReaperConfig::default() });
        let reaped = reaper.sweep_once().await.unwrap();
        assert_eq!(reaped, 1);
        let task = store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn seals_abandoned_executing_tasks() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let task = Task::new("u", "t", "d");
        store.create_task(&task).await.unwrap();
        store.cas_task_status(task.id, TaskStatus::Pending, TaskStatus::Classifying).await.unwrap();
        let exec = Execution::new(task.id, "Iterative");
        store.start_execution(task.id, &exec).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig { stale_window_sec: -1, ..ReaperConfig::default() });
        let reaped = reaper.sweep_once().await.unwrap();
        assert_eq!(reaped, 1);
        let task = store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn leaves_fresh_tasks_alone() {
        let store = TaskStore::open_in_memory().await.unwrap();
        let task = Task::new("u", "t", "d");
        store.create_task(&task).await.unwrap();
        store.cas_task_status(task.id, TaskStatus::Pending, TaskStatus::Classifying).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig::default());
        let reaped = reaper.sweep_once().await.unwrap();
        assert_eq!(reaped, 0);
    }
}
