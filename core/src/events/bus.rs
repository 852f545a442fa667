//! Message bus seam (§6 "Message bus"): at-least-once publish, per-subject
//! FIFO. The real client is an external collaborator; this crate ships a
//! logging/no-op implementation suitable for tests and single-instance
//! deployments.

use async_trait::async_trait;
use tracing::info;

/// One bus publish attempt: a subject (topic/queue name) and a JSON body.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: &str) -> Result<(), String>;
}

/// Logs every publish and always succeeds. Matches the "no external bus
/// dependency required to run" stance the rest of this crate takes for its
/// own collaborators (classifier, validator).
pub struct LoggingEventBus;

#[async_trait]
impl EventBus for LoggingEventBus {
    async fn publish(&self, subject: &str, payload: &str) -> Result<(), String> {
        info!(subject, payload, "event_bus: publish");
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every publish call; optionally fails the first N attempts to
    /// exercise the publisher's retry/backoff path.
    pub struct RecordingEventBus {
        published: Mutex<Vec<(String, String)>>,
        fail_next: Mutex<u32>,
    }

    impl RecordingEventBus {
        pub fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_next: Mutex::new(0),
            }
        }

        pub fn failing(times: u32) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_next: Mutex::new(times),
            }
        }

        pub fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventBus for RecordingEventBus {
        async fn publish(&self, subject: &str, payload: &str) -> Result<(), String> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err("simulated bus failure".to_string());
            }
            self.published.lock().unwrap().push((subject.to_string(), payload.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_bus_always_succeeds() {
        let bus = LoggingEventBus;
        assert!(bus.publish("tasks.succeeded", "{}").await.is_ok());
    }
}
