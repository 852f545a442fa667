//! Event Publisher (L11): typed terminal-transition payloads, the bus
//! seam, and the outbox pump that drives at-least-once delivery.

pub mod bus;
pub mod publisher;
pub mod types;

pub use bus::{EventBus, LoggingEventBus};
pub use publisher::EventPublisher;
pub use types::{TaskCancelled, TaskFailed, TaskSucceeded, TaskTimedOut, SCHEMA_VERSION};
