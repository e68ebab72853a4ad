use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// Which transport backs the task, heartbeat and completion streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamBackend {
    Redis,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub backend: StreamBackend,
    pub url: String,
    /// Stream the submission gateway appends tasks to.
    pub task_stream: String,
    pub consumer_group: String,
    pub consumer_name: String,
    /// Per-worker dispatch channel name is `"<dispatch_prefix><worker_id>"`.
    pub dispatch_prefix: String,
    pub completion_stream: String,
    pub heartbeat_stream: String,
    pub batch_size: usize,
    /// How long one stream read blocks when the stream is empty.
    pub block_ms: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: StreamBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            task_stream: "scheduler:tasks".to_string(),
            consumer_group: "scheduler-dispatchers".to_string(),
            consumer_name: "dispatcher-1".to_string(),
            dispatch_prefix: "dispatch:".to_string(),
            completion_stream: "scheduler:completions".to_string(),
            heartbeat_stream: "scheduler:heartbeats".to_string(),
            batch_size: 10,
            block_ms: 1000,
            max_retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl ConfigValidator for StreamConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.backend == StreamBackend::Redis {
            ValidationUtils::validate_url(&self.url, "stream.url")?;
        }
        ValidationUtils::validate_not_empty(&self.task_stream, "stream.task_stream")?;
        ValidationUtils::validate_not_empty(&self.consumer_group, "stream.consumer_group")?;
        ValidationUtils::validate_not_empty(&self.consumer_name, "stream.consumer_name")?;
        ValidationUtils::validate_not_empty(&self.dispatch_prefix, "stream.dispatch_prefix")?;
        ValidationUtils::validate_not_empty(&self.completion_stream, "stream.completion_stream")?;
        ValidationUtils::validate_not_empty(&self.heartbeat_stream, "stream.heartbeat_stream")?;
        ValidationUtils::validate_count(self.batch_size, "stream.batch_size", 1000)?;
        ValidationUtils::validate_positive_ms(self.block_ms, "stream.block_ms")?;
        Ok(())
    }
}
