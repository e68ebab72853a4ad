pub mod connection;
pub mod sources;

pub use connection::RedisConnectionManager;
pub use sources::RedisTelemetrySources;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::streams::StreamReadReply;
use redis::Value;
use tracing::{debug, warn};

use foresight_config::StreamConfig;
use foresight_domain::ports::{DispatchPublisher, TaskEnvelope, TaskStream};
use foresight_errors::{SchedulerError, SchedulerResult};

/// Consumer-group reader and per-worker channel writer over Redis Streams.
pub struct RedisStreamTransport {
    connection: Arc<RedisConnectionManager>,
    config: StreamConfig,
}

impl RedisStreamTransport {
    pub async fn new(config: StreamConfig) -> SchedulerResult<Self> {
        let connection = Arc::new(RedisConnectionManager::new(&config).await?);
        let transport = Self { connection, config };
        transport
            .ensure_group(&transport.config.task_stream, &transport.config.consumer_group)
            .await?;
        Ok(transport)
    }

    pub fn connection(&self) -> Arc<RedisConnectionManager> {
        self.connection.clone()
    }

    /// Create the stream and consumer group if either is missing.
    async fn ensure_group(&self, stream: &str, group: &str) -> SchedulerResult<()> {
        ensure_group(&self.connection, stream, group).await
    }

    pub async fn health_check(&self) -> bool {
        self.connection.ping().await.is_ok()
    }
}

#[async_trait]
impl TaskStream for RedisStreamTransport {
    async fn read_batch(
        &self,
        max_count: usize,
        block: Duration,
    ) -> SchedulerResult<Vec<TaskEnvelope>> {
        read_group(
            &self.connection,
            &self.config.task_stream,
            &self.config.consumer_group,
            &self.config.consumer_name,
            max_count,
            block,
        )
        .await
    }

    async fn ack(&self, entry_id: &str) -> SchedulerResult<()> {
        ack_entry(
            &self.connection,
            &self.config.task_stream,
            &self.config.consumer_group,
            entry_id,
        )
        .await
    }
}

#[async_trait]
impl DispatchPublisher for RedisStreamTransport {
    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(channel).arg("*").arg("payload").arg(payload);
        let entry_id: String = self.connection.execute_command(&cmd).await?;
        debug!(%channel, %entry_id, "published dispatch assignment");
        Ok(())
    }
}

pub(crate) async fn ensure_group(
    connection: &RedisConnectionManager,
    stream: &str,
    group: &str,
) -> SchedulerResult<()> {
    let mut cmd = redis::cmd("XGROUP");
    cmd.arg("CREATE").arg(stream).arg(group).arg("0").arg("MKSTREAM");

    match connection.execute_command::<String>(&cmd).await {
        Ok(_) => {
            debug!(%stream, %group, "created consumer group");
            Ok(())
        }
        Err(e) => {
            if e.to_string().contains("BUSYGROUP") {
                debug!(%stream, %group, "consumer group already exists");
                Ok(())
            } else {
                Err(SchedulerError::message_queue(format!(
                    "failed to create consumer group {group} on {stream}: {e}"
                )))
            }
        }
    }
}

/// `XREADGROUP` one batch and convert the reply into envelopes.
pub(crate) async fn read_group(
    connection: &RedisConnectionManager,
    stream: &str,
    group: &str,
    consumer: &str,
    max_count: usize,
    block: Duration,
) -> SchedulerResult<Vec<TaskEnvelope>> {
    let mut cmd = redis::cmd("XREADGROUP");
    cmd.arg("GROUP")
        .arg(group)
        .arg(consumer)
        .arg("COUNT")
        .arg(max_count)
        .arg("BLOCK")
        .arg(block.as_millis() as u64)
        .arg("STREAMS")
        .arg(stream)
        .arg(">");

    let raw: Value = connection.execute_command(&cmd).await?;
    if matches!(raw, Value::Nil) {
        // Block window elapsed with nothing to read.
        return Ok(Vec::new());
    }

    let reply: StreamReadReply = redis::from_redis_value(&raw).map_err(|e| {
        SchedulerError::message_queue(format!("unexpected XREADGROUP reply shape: {e}"))
    })?;

    let mut envelopes = Vec::new();
    for key in reply.keys {
        for entry in key.ids {
            let mut fields = HashMap::with_capacity(entry.map.len());
            for (name, value) in &entry.map {
                match redis::from_redis_value::<String>(value) {
                    Ok(text) => {
                        fields.insert(name.clone(), text);
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.id, field = %name, "skipping non-string field: {e}");
                    }
                }
            }
            envelopes.push(TaskEnvelope::new(entry.id.clone(), fields));
        }
    }
    Ok(envelopes)
}

pub(crate) async fn ack_entry(
    connection: &RedisConnectionManager,
    stream: &str,
    group: &str,
    entry_id: &str,
) -> SchedulerResult<()> {
    let mut cmd = redis::cmd("XACK");
    cmd.arg(stream).arg(group).arg(entry_id);
    let acked: i64 = connection.execute_command(&cmd).await?;
    if acked == 0 {
        warn!(%entry_id, "entry was not acknowledged, possibly already processed");
    }
    Ok(())
}
