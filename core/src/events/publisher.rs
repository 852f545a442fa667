//! Event Publisher (L11): the outbox pump.
//!
//! Polls `OutboxMessage` rows, attempts delivery to the bus, and retries
//! failed deliveries with exponential backoff. Runs as the elected leader
//! within a service instance group, gated by the store's publisher lease.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use taskstore::{OutboxMessage, TaskStore};

use crate::config::OutboxConfig;

use super::bus::EventBus;

const BACKOFF_BASE_MS: i64 = 500;
const BACKOFF_FACTOR: i64 = 2;
const BACKOFF_CAP_MS: i64 = 60_000;
const LEASE_TTL_MS: i64 = 5_000;

/// Backoff delay (ms) for the `attempt`-th retry (0-indexed), base 500 ms,
/// factor 2, capped at 60 s, jitter ±20%.
pub fn backoff_delay_ms(attempt: u32, jitter: f64) -> i64 {
    let raw = BACKOFF_BASE_MS.saturating_mul(BACKOFF_FACTOR.saturating_pow(attempt));
    let capped = raw.min(BACKOFF_CAP_MS);
    let jittered = capped as f64 * (1.0 + jitter);
    jittered.round().max(0.0) as i64
}

pub struct EventPublisher {
    store: TaskStore,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
    owner: String,
}

impl EventPublisher {
    pub fn new(store: TaskStore, bus: Arc<dyn EventBus>, config: OutboxConfig, owner: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            config,
            owner: owner.into(),
        }
    }

    fn subject_for(message: &OutboxMessage) -> String {
        format!("orchestrator.{}", message.kind.as_str())
    }

    /// Process at most one batch, if this instance currently holds the
    /// publisher lease. Returns the number of messages delivered.
    pub async fn pump_once(&self) -> eyre::Result<usize> {
        if !self.store.acquire_lease(&self.owner, LEASE_TTL_MS).await? {
            debug!("publisher: lease held elsewhere, skipping this tick");
            return Ok(0);
        }

        let batch = self.store.fetch_outbox_batch(self.config.batch_size).await?;
        let mut delivered = 0;
        for message in batch {
            let subject = Self::subject_for(&message);
            match self.bus.publish(&subject, &message.payload).await {
                Ok(()) => {
                    self.store.mark_outbox_delivered(message.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
                    let delay = backoff_delay_ms(message.attempt_count, jitter);
                    warn!(task_id = %message.task_id, error = %e, delay_ms = delay, "publisher: delivery failed, rescheduling");
                    let next_attempt_at = taskstore::ids::now_ms() + delay;
                    self.store.reschedule_outbox(message.id, next_attempt_at).await?;
                }
            }
        }
        if delivered > 0 {
            info!(delivered, "publisher: batch delivered");
        }
        Ok(delivered)
    }

    /// Run forever on a fixed poll interval until `shutdown` fires.
    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.pump_once().await {
                        warn!(error = %e, "publisher: pump failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("publisher: shutting down");
                        let _ = self.store.release_lease(&self.owner).await;
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
    use crate::events::bus::mock::RecordingEventBus;
    use taskstore::{ExecutionStatus, OutboxKind, Task, TaskStatus};

    async fn seed_outbox(store: &TaskStore) {
        let task = Task::new("u", "t", "d");
        store.create_task(&task).await.unwrap();
        store.cas_task_status(task.id, TaskStatus::Pending, TaskStatus::Classifying).await.unwrap();
        let exec = taskstore::Execution::new(task.id, "SingleShot");
        store.start_execution(task.id, &exec).await.unwrap();
        store
            .finalize(
                exec.id,
                ExecutionStatus::Failed,
                Some("no parseable changes".into()),
                None,
                task.id,
                TaskStatus::Failed,
                OutboxKind::TaskFailed,
                "{}".to_string(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_and_drains_the_outbox() {
        let store = TaskStore::open_in_memory().await.unwrap();
        seed_outbox(&store).await;
        let bus = Arc::new(RecordingEventBus::new());
        let publisher = EventPublisher::new(store.clone(), bus.clone(), OutboxConfig::default(), "node-a");

        let delivered = publisher.pump_once().await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(bus.published().len(), 1);
        assert!(store.fetch_outbox_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reschedules_on_delivery_failure() {
        let store = TaskStore::open_in_memory().await.unwrap();
        seed_outbox(&store).await;
        let bus = Arc::new(RecordingEventBus::failing(1));
        let publisher = EventPublisher::new(store.clone(), bus, OutboxConfig::default(), "node-a");

        let delivered = publisher.pump_once().await.unwrap();
        assert_eq!(delivered, 0);
        let batch = store.fetch_outbox_batch(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempt_count, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay_ms(0, 0.0), 500);
        assert_eq!(backoff_delay_ms(1, 0.0), 1000);
        assert_eq!(backoff_delay_ms(10, 0.0), 60_000);
    }
}
