use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use foresight_errors::SchedulerResult;

/// One raw entry read off the task stream, before parsing.
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    /// Broker-assigned entry id, used for acknowledgment.
    pub entry_id: String,
    pub fields: HashMap<String, String>,
}

impl TaskEnvelope {
    pub fn new(entry_id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            fields,
        }
    }
}

/// Consumer-group view of the durable task stream.
///
/// Delivery is at-least-once: entries not acknowledged are redelivered by
/// the broker, so callers must only `ack` after the downstream publish has
/// succeeded.
#[async_trait]
pub trait TaskStream: Send + Sync {
    /// Read up to `max_count` entries, blocking up to `block` when the
    /// stream is empty. An empty vec after the block window is not an error.
    async fn read_batch(
        &self,
        max_count: usize,
        block: Duration,
    ) -> SchedulerResult<Vec<TaskEnvelope>>;

    async fn ack(&self, entry_id: &str) -> SchedulerResult<()>;
}

/// Egress to the per-worker dispatch channels.
#[async_trait]
pub trait DispatchPublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()>;
}
