//! In-memory transport for embedded deployments and tests. Mirrors the
//! broker semantics the scheduler relies on: at-least-once delivery with
//! per-entry acknowledgment, and per-channel dispatch fan-out.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use foresight_domain::models::{PredictionSnapshot, Task};
use foresight_domain::ports::{
    DispatchPublisher, PredictionStore, TaskEnvelope, TaskStream,
};
use foresight_errors::SchedulerResult;

/// Channel-backed task stream with explicit redelivery of unacked entries.
///
/// Read entries move into a pending set until acked, as a consumer group
/// would track them; `redeliver_unacked` plays the role of the broker's
/// pending-entry claim after a consumer failure.
#[derive(Default)]
pub struct InMemoryTaskStream {
    queue: Mutex<VecDeque<TaskEnvelope>>,
    unacked: Mutex<HashMap<String, TaskEnvelope>>,
    next_id: AtomicU64,
}

impl InMemoryTaskStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw fields; returns the assigned entry id.
    pub fn push(&self, fields: HashMap<String, String>) -> String {
        let entry_id = format!("{}-0", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(TaskEnvelope::new(entry_id.clone(), fields));
        entry_id
    }

    /// Append a task in the ingress wire format.
    pub fn push_task(&self, task: &Task) -> SchedulerResult<String> {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), task.id.clone());
        fields.insert("type".to_string(), task.task_type.clone());
        fields.insert("priority".to_string(), task.priority.to_string());
        fields.insert("createdAt".to_string(), task.created_at.to_rfc3339());
        fields.insert("payload".to_string(), serde_json::to_string(&task.payload)?);
        if !task.required_capabilities.is_empty() {
            fields.insert(
                "requiredCapabilities".to_string(),
                task.required_capabilities.join(","),
            );
        }
        if let Some(metadata) = &task.metadata {
            fields.insert("metadata".to_string(), serde_json::to_string(metadata)?);
        }
        Ok(self.push(fields))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Move every unacked entry back to the front of the queue.
    pub fn redeliver_unacked(&self) {
        let mut unacked = self.unacked.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<TaskEnvelope> = unacked.drain().map(|(_, e)| e).collect();
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries.into_iter().rev() {
            queue.push_front(entry);
        }
    }
}

#[async_trait]
impl TaskStream for InMemoryTaskStream {
    async fn read_batch(
        &self,
        max_count: usize,
        block: Duration,
    ) -> SchedulerResult<Vec<TaskEnvelope>> {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if !queue.is_empty() {
                let take = max_count.min(queue.len());
                let batch: Vec<TaskEnvelope> = queue.drain(..take).collect();
                let mut unacked = self.unacked.lock().unwrap_or_else(|e| e.into_inner());
                for envelope in &batch {
                    unacked.insert(envelope.entry_id.clone(), envelope.clone());
                }
                return Ok(batch);
            }
        }
        // Emulate the broker's blocking read on an empty stream.
        tokio::time::sleep(block).await;
        Ok(Vec::new())
    }

    async fn ack(&self, entry_id: &str) -> SchedulerResult<()> {
        if self.unacked.lock().unwrap_or_else(|e| e.into_inner()).remove(entry_id).is_none() {
            debug!(%entry_id, "ack for unknown entry ignored");
        }
        Ok(())
    }
}

/// Dispatch channels backed by per-channel buffers, with optional live
/// subscription for in-process workers.
#[derive(Default)]
pub struct InMemoryDispatchChannels {
    published: Mutex<HashMap<String, Vec<String>>>,
    subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl InMemoryDispatchChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published on one channel so far.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn published_len(&self) -> usize {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).values().map(Vec::len).sum()
    }

    /// Receive future publishes on a channel as they happen.
    pub fn subscribe(&self, channel: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel.to_string(), tx);
        rx
    }
}

#[async_trait]
impl DispatchPublisher for InMemoryDispatchChannels {
    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(channel.to_string())
            .or_default()
            .push(payload.to_string());

        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = subscribers.get(channel) {
            if tx.send(payload.to_string()).is_err() {
                subscribers.remove(channel);
            }
        }
        Ok(())
    }
}

/// Single-slot prediction store for embedded runs.
#[derive(Default)]
pub struct InMemoryPredictionStore {
    snapshot: Mutex<Option<PredictionSnapshot>>,
}

impl InMemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for InMemoryPredictionStore {
    async fn load(&self) -> SchedulerResult<Option<PredictionSnapshot>> {
        Ok(self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, snapshot: &PredictionSnapshot) -> SchedulerResult<()> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foresight_testing_utils::builders::TaskBuilder;

    #[tokio::test]
    async fn test_read_moves_entries_to_unacked() {
        let stream = InMemoryTaskStream::new();
        stream.push_task(&TaskBuilder::new("t1", "etl").build()).unwrap();
        stream.push_task(&TaskBuilder::new("t2", "etl").build()).unwrap();

        let batch = stream
            .read_batch(10, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(stream.queue_len(), 0);
        assert_eq!(stream.unacked_len(), 2);

        stream.ack(&batch[0].entry_id).await.unwrap();
        assert_eq!(stream.unacked_len(), 1);
    }

    #[tokio::test]
    async fn test_batch_respects_max_count_and_order() {
        let stream = InMemoryTaskStream::new();
        for i in 0..5 {
            stream
                .push_task(&TaskBuilder::new(&format!("t{i}"), "etl").build())
                .unwrap();
        }

        let batch = stream
            .read_batch(2, Duration::from_millis(5))
            .await
            .unwrap();
        let ids: Vec<&str> = batch
            .iter()
            .map(|e| e.fields.get("id").unwrap().as_str())
            .collect();
        assert_eq!(ids, vec!["t0", "t1"]);
        assert_eq!(stream.queue_len(), 3);
    }

    #[tokio::test]
    async fn test_empty_read_blocks_then_returns_empty() {
        let stream = InMemoryTaskStream::new();
        let started = std::time::Instant::now();
        let batch = stream
            .read_batch(10, Duration::from_millis(30))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_redelivery_preserves_entry_ids() {
        let stream = InMemoryTaskStream::new();
        let entry_id = stream
            .push_task(&TaskBuilder::new("t1", "etl").build())
            .unwrap();

        let batch = stream
            .read_batch(10, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(batch[0].entry_id, entry_id);

        stream.redeliver_unacked();
        assert_eq!(stream.unacked_len(), 0);
        let batch = stream
            .read_batch(10, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(batch[0].entry_id, entry_id);
    }

    #[tokio::test]
    async fn test_dispatch_channels_record_and_forward() {
        let channels = InMemoryDispatchChannels::new();
        let mut rx = channels.subscribe("dispatch:w1");

        channels.publish("dispatch:w1", "{\"taskId\":\"t1\"}").await.unwrap();
        channels.publish("dispatch:w2", "{\"taskId\":\"t2\"}").await.unwrap();

        assert_eq!(channels.published_on("dispatch:w1").len(), 1);
        assert_eq!(channels.published_on("dispatch:w2").len(), 1);
        assert_eq!(channels.published_len(), 2);
        assert_eq!(rx.recv().await.unwrap(), "{\"taskId\":\"t1\"}");
    }

    #[tokio::test]
    async fn test_prediction_store_round_trip() {
        use foresight_domain::models::EmaState;

        let store = InMemoryPredictionStore::new();
        assert!(store.load().await.unwrap().is_none());

        let snapshot =
            PredictionSnapshot::from_states([EmaState::first_sample("etl", 1000.0)].iter());
        store.save(&snapshot).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.predictions.len(), 1);
    }
}
