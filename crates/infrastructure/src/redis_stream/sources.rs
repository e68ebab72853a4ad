//! Pumps that turn the heartbeat and completion streams into bounded
//! channels of parsed records. Telemetry is acked as soon as it is parsed:
//! a lost heartbeat is replaced by the next one, so at-most-once is fine
//! here, unlike the task stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use foresight_config::StreamConfig;
use foresight_domain::models::{CompletionEvent, HeartbeatRecord};
use foresight_domain::ports::TaskEnvelope;
use foresight_errors::{SchedulerError, SchedulerResult};

use super::connection::RedisConnectionManager;
use super::{ack_entry, ensure_group, read_group};

pub struct RedisTelemetrySources {
    connection: Arc<RedisConnectionManager>,
    config: StreamConfig,
}

impl RedisTelemetrySources {
    pub fn new(connection: Arc<RedisConnectionManager>, config: StreamConfig) -> Self {
        Self { connection, config }
    }

    pub async fn ensure_groups(&self) -> SchedulerResult<()> {
        ensure_group(
            &self.connection,
            &self.config.heartbeat_stream,
            &self.config.consumer_group,
        )
        .await?;
        ensure_group(
            &self.connection,
            &self.config.completion_stream,
            &self.config.consumer_group,
        )
        .await
    }

    pub fn spawn_heartbeat_pump(
        &self,
        tx: mpsc::Sender<HeartbeatRecord>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        self.spawn_pump(
            self.config.heartbeat_stream.clone(),
            format!("{}-heartbeats", self.config.consumer_name),
            tx,
            shutdown,
            parse_heartbeat,
        )
    }

    pub fn spawn_completion_pump(
        &self,
        tx: mpsc::Sender<CompletionEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        self.spawn_pump(
            self.config.completion_stream.clone(),
            format!("{}-completions", self.config.consumer_name),
            tx,
            shutdown,
            parse_completion,
        )
    }

    fn spawn_pump<T: Send + 'static>(
        &self,
        stream: String,
        consumer: String,
        tx: mpsc::Sender<T>,
        mut shutdown: broadcast::Receiver<()>,
        parse: fn(&HashMap<String, String>) -> SchedulerResult<T>,
    ) -> JoinHandle<()> {
        let connection = self.connection.clone();
        let group = self.config.consumer_group.clone();
        let batch = self.config.batch_size;
        let block = Duration::from_millis(self.config.block_ms);

        tokio::spawn(async move {
            info!(%stream, "telemetry pump started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    result = read_group(&connection, &stream, &group, &consumer, batch, block) => {
                        match result {
                            Ok(envelopes) => {
                                for envelope in envelopes {
                                    pump_one(&connection, &stream, &group, &tx, parse, envelope)
                                        .await;
                                }
                            }
                            Err(e) => {
                                warn!(%stream, "telemetry read failed: {e}");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
            info!(%stream, "telemetry pump stopped");
        })
    }
}

async fn pump_one<T>(
    connection: &RedisConnectionManager,
    stream: &str,
    group: &str,
    tx: &mpsc::Sender<T>,
    parse: fn(&HashMap<String, String>) -> SchedulerResult<T>,
    envelope: TaskEnvelope,
) {
    match parse(&envelope.fields) {
        Ok(record) => {
            if tx.send(record).await.is_err() {
                warn!(%stream, "telemetry receiver closed, dropping record");
            }
        }
        Err(e) => warn!(%stream, entry_id = %envelope.entry_id, "dropping malformed record: {e}"),
    }
    if let Err(e) = ack_entry(connection, stream, group, &envelope.entry_id).await {
        warn!(%stream, entry_id = %envelope.entry_id, "telemetry ack failed: {e}");
    }
}

/// Heartbeats arrive as flat string fields.
pub fn parse_heartbeat(fields: &HashMap<String, String>) -> SchedulerResult<HeartbeatRecord> {
    let worker_id = fields
        .get("workerId")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SchedulerError::message_queue("heartbeat missing workerId"))?
        .clone();

    let parse_f64 = |name: &str| -> SchedulerResult<f64> {
        fields
            .get(name)
            .ok_or_else(|| SchedulerError::message_queue(format!("heartbeat missing {name}")))?
            .parse::<f64>()
            .map_err(|e| SchedulerError::message_queue(format!("heartbeat {name} invalid: {e}")))
    };

    let queue_depth = fields
        .get("queueDepth")
        .ok_or_else(|| SchedulerError::message_queue("heartbeat missing queueDepth"))?
        .parse::<u32>()
        .map_err(|e| SchedulerError::message_queue(format!("heartbeat queueDepth invalid: {e}")))?;

    let timestamp_ms = fields
        .get("timestampMs")
        .ok_or_else(|| SchedulerError::message_queue("heartbeat missing timestampMs"))?
        .parse::<i64>()
        .map_err(|e| SchedulerError::message_queue(format!("heartbeat timestampMs invalid: {e}")))?;

    Ok(HeartbeatRecord {
        worker_id,
        cpu_usage: parse_f64("cpuUsage")?,
        memory_usage: parse_f64("memoryUsage")?,
        queue_depth,
        timestamp_ms,
    })
}

/// Completions arrive as one JSON blob under `payload`.
pub fn parse_completion(fields: &HashMap<String, String>) -> SchedulerResult<CompletionEvent> {
    let payload = fields
        .get("payload")
        .ok_or_else(|| SchedulerError::message_queue("completion missing payload"))?;
    serde_json::from_str(payload)
        .map_err(|e| SchedulerError::message_queue(format!("completion payload invalid: {e}")))
}
