use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use foresight_config::{DispatchConfig, ScoringConfig, StreamConfig};
use foresight_domain::models::{
    DecisionReason, DispatchAssignment, DispatchResult, SchedulingDecision, Task,
};
use foresight_domain::ports::{DispatchPublisher, DurationPredictor, TaskEnvelope, TaskStream};
use foresight_errors::SchedulerResult;

use crate::circuit_breaker::{CircuitBreakerState, PredictorCircuitBreaker};
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};
use crate::registry::WorkerRegistry;
use crate::scorer::DecisionScorer;
use crate::strategies::{FallbackStrategy, LowestLoadStrategy, RoundRobinStrategy};

/// Point-in-time view of the dispatcher for the management plane.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    pub metrics: MetricsSnapshot,
    pub breaker: CircuitBreakerState,
    pub registered_workers: usize,
}

/// Owns the consume → predict → score → publish loop.
///
/// One instance drives one consumer-group member. Within a task id the
/// ordering is strict: decision, then publish, then ack; a failed publish
/// leaves the stream entry unacked so the broker redelivers it.
pub struct TaskDispatcher {
    stream: Arc<dyn TaskStream>,
    publisher: Arc<dyn DispatchPublisher>,
    registry: Arc<WorkerRegistry>,
    predictor: Arc<dyn DurationPredictor>,
    scorer: DecisionScorer,
    fallback: Box<dyn FallbackStrategy>,
    breaker: Mutex<PredictorCircuitBreaker>,
    metrics: DispatcherMetrics,
    stream_config: StreamConfig,
}

impl TaskDispatcher {
    pub fn new(
        stream: Arc<dyn TaskStream>,
        publisher: Arc<dyn DispatchPublisher>,
        registry: Arc<WorkerRegistry>,
        predictor: Arc<dyn DurationPredictor>,
        stream_config: StreamConfig,
        dispatch_config: DispatchConfig,
        scoring_config: ScoringConfig,
    ) -> Self {
        let fallback: Box<dyn FallbackStrategy> =
            match dispatch_config.fallback_strategy.as_str() {
                "lowest_load" => Box::new(LowestLoadStrategy::new()),
                _ => Box::new(RoundRobinStrategy::new()),
            };
        Self {
            stream,
            publisher,
            registry,
            predictor,
            scorer: DecisionScorer::new(scoring_config),
            fallback,
            breaker: Mutex::new(PredictorCircuitBreaker::new(
                dispatch_config.fallback_threshold,
                Duration::from_millis(dispatch_config.probe_interval_ms),
            )),
            metrics: DispatcherMetrics::new(),
            stream_config,
        }
    }

    /// Drive the loop until shutdown is broadcast. Stream read errors are
    /// logged and retried after a second, indefinitely: while the broker is
    /// down the scheduler makes no progress, by contract.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!(
            stream = %self.stream_config.task_stream,
            group = %self.stream_config.consumer_group,
            "dispatcher started"
        );
        let block = Duration::from_millis(self.stream_config.block_ms);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("dispatcher shutting down");
                    break;
                }
                batch = self.stream.read_batch(self.stream_config.batch_size, block) => {
                    match batch {
                        Ok(envelopes) => {
                            // Batch entries are handled in stream order.
                            for envelope in envelopes {
                                self.process_envelope(envelope).await;
                            }
                        }
                        Err(e) => {
                            error!("task stream read failed: {e}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        info!("dispatcher stopped");
        Ok(())
    }

    /// Parse and dispatch one stream entry, acking according to outcome.
    pub async fn process_envelope(&self, envelope: TaskEnvelope) -> DispatchResult {
        self.metrics.record_task_processed();

        let task = match Task::from_stream_fields(&envelope.fields) {
            Ok(task) => task,
            Err(e) => {
                // Poison draining: ack so the broker stops redelivering it.
                warn!(entry_id = %envelope.entry_id, "dropping malformed task: {e}");
                self.metrics.record_malformed_task();
                if let Err(ack_err) = self.stream.ack(&envelope.entry_id).await {
                    warn!(entry_id = %envelope.entry_id, "ack of malformed task failed: {ack_err}");
                }
                return DispatchResult {
                    success: false,
                    decision: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let started = Instant::now();
        let result = self.dispatch_task(&task).await;
        self.metrics
            .record_dispatch_duration(started.elapsed().as_secs_f64() * 1000.0);

        if result.success {
            if let Err(e) = self.stream.ack(&envelope.entry_id).await {
                warn!(entry_id = %envelope.entry_id, "ack failed, broker will redeliver: {e}");
            }
        } else {
            debug!(
                entry_id = %envelope.entry_id,
                error = result.error.as_deref().unwrap_or(""),
                "leaving entry unacked for redelivery"
            );
        }
        result
    }

    /// Choose a worker for the task and publish the assignment.
    pub async fn dispatch_task(&self, task: &Task) -> DispatchResult {
        let candidates = self.registry.available(&task.required_capabilities);

        let mut prediction = None;
        if self.breaker().should_attempt() {
            match self.predictor.predict(task) {
                Ok(p) => prediction = p,
                Err(e) => {
                    warn!(task_id = %task.id, "predictor failed: {e}");
                    self.metrics.record_predictor_error();
                    self.breaker().record_failure();
                }
            }
        }

        let selection = prediction
            .as_ref()
            .and_then(|p| self.scorer.select(task, &candidates, Some(p)));

        let decision = if let (Some(mut prediction), Some(selection)) = (prediction, selection) {
            prediction.recommended_worker = Some(selection.worker_id.clone());
            debug!(
                task_id = %task.id,
                worker_id = %selection.worker_id,
                reasoning = %selection.reasoning,
                "prediction-backed decision"
            );
            self.breaker().record_success();
            self.metrics.record_predicted_dispatch();
            SchedulingDecision::predicted(&task.id, &selection.worker_id, prediction)
        } else {
            let reason = if self.breaker().is_open() {
                DecisionReason::FallbackCircuitBreaker
            } else {
                DecisionReason::FallbackRoundRobin
            };
            match self.fallback.select(task, &candidates) {
                Some(worker_id) => {
                    debug!(task_id = %task.id, %worker_id, ?reason, "fallback decision");
                    self.metrics.record_fallback_dispatch();
                    SchedulingDecision::fallback(&task.id, &worker_id, reason)
                }
                None => {
                    warn!(task_id = %task.id, "no workers available");
                    self.metrics.record_no_workers();
                    return DispatchResult::no_workers();
                }
            }
        };

        self.publish_assignment(task, decision).await
    }

    async fn publish_assignment(&self, task: &Task, decision: SchedulingDecision) -> DispatchResult {
        let assignment = DispatchAssignment::new(task.clone(), decision.decided_at);
        let payload = match assignment.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(task_id = %task.id, "failed to encode assignment: {e}");
                self.metrics.record_publish_failure();
                return DispatchResult::publish_failed(decision, e.to_string());
            }
        };

        let channel = format!("{}{}", self.stream_config.dispatch_prefix, decision.worker_id);
        match self.publisher.publish(&channel, &payload).await {
            Ok(()) => {
                debug!(task_id = %task.id, worker_id = %decision.worker_id, %channel, "task dispatched");
                DispatchResult::dispatched(decision)
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    worker_id = %decision.worker_id,
                    "publish failed, decision retained but entry stays unacked: {e}"
                );
                self.metrics.record_publish_failure();
                DispatchResult::publish_failed(decision, e.to_string())
            }
        }
    }

    pub fn scorer(&self) -> &DecisionScorer {
        &self.scorer
    }

    pub fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        self.breaker().state()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            metrics: self.metrics.snapshot(),
            breaker: self.breaker().state(),
            registered_workers: self.registry.len(),
        }
    }

    fn breaker(&self) -> MutexGuard<'_, PredictorCircuitBreaker> {
        // The breaker is only touched from the dispatch loop; a poisoned
        // lock can only mean a panicked test thread, so take it anyway.
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use foresight_config::PredictionConfig;
    use foresight_domain::models::WorkerRegistration;
    use foresight_infrastructure::in_memory::InMemoryTaskStream;
    use foresight_predictor::HeuristicPredictor;
    use foresight_testing_utils::builders::TaskBuilder;
    use foresight_testing_utils::mocks::{
        FailingPredictor, FixedPredictor, MemoryPredictionStore, RecordingPublisher,
    };

    fn registry_with_workers(ids: &[&str]) -> Arc<WorkerRegistry> {
        let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(30)));
        for id in ids {
            registry
                .register(WorkerRegistration {
                    worker_id: id.to_string(),
                    capabilities: vec![],
                    max_concurrency: 4,
                })
                .unwrap();
        }
        registry
    }

    fn dispatcher_with(
        predictor: Arc<dyn DurationPredictor>,
        registry: Arc<WorkerRegistry>,
        dispatch_config: DispatchConfig,
    ) -> (TaskDispatcher, Arc<InMemoryTaskStream>, Arc<RecordingPublisher>) {
        let stream = Arc::new(InMemoryTaskStream::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = TaskDispatcher::new(
            stream.clone(),
            publisher.clone(),
            registry,
            predictor,
            StreamConfig::default(),
            dispatch_config,
            ScoringConfig::default(),
        );
        (dispatcher, stream, publisher)
    }

    fn task_fields(id: &str, task_type: &str) -> HashMap<String, String> {
        [
            ("id".to_string(), id.to_string()),
            ("type".to_string(), task_type.to_string()),
            ("payload".to_string(), "{}".to_string()),
            ("priority".to_string(), "5".to_string()),
        ]
        .into()
    }

    #[tokio::test]
    async fn test_cold_start_unknown_type_dispatches_deterministically() {
        let registry = registry_with_workers(&["w1", "w2", "w3"]);
        let predictor = Arc::new(
            HeuristicPredictor::new(
                Arc::new(MemoryPredictionStore::new()),
                PredictionConfig::default(),
            ),
        );
        let (dispatcher, stream, publisher) =
            dispatcher_with(predictor, registry, DispatchConfig::default());

        stream.push(task_fields("t1", "never-seen"));
        let envelope = stream
            .read_batch(10, Duration::from_millis(10))
            .await
            .unwrap()
            .remove(0);
        let result = dispatcher.process_envelope(envelope).await;

        assert!(result.success);
        let decision = result.decision.unwrap();
        assert_eq!(decision.reason, DecisionReason::Prediction);
        assert!(!decision.used_fallback);
        // All workers equal: stable id ordering makes w1 the choice.
        assert_eq!(decision.worker_id, "w1");

        let prediction = decision.prediction.unwrap();
        assert_eq!(prediction.estimated_duration_ms, 5000.0);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.recommended_worker.as_deref(), Some("w1"));

        // Published on the per-worker channel, entry acked.
        let published = publisher.published_on("dispatch:w1");
        assert_eq!(published.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(payload["taskId"], "t1");
        assert!(payload.get("task").is_some());
        assert!(payload.get("assignedAt").is_some());
        assert_eq!(stream.unacked_len(), 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_probes_closed() {
        let registry = registry_with_workers(&["w1", "w2"]);
        let predictor = Arc::new(FixedPredictor::new(2000.0, 0.5));
        predictor.set_failing(true);
        let config = DispatchConfig {
            fallback_threshold: 3,
            probe_interval_ms: 20,
            ..Default::default()
        };
        let (dispatcher, _stream, _publisher) =
            dispatcher_with(predictor.clone(), registry, config);

        let task = TaskBuilder::new("t1", "etl").build();
        for _ in 0..3 {
            let result = dispatcher.dispatch_task(&task).await;
            assert!(result.success);
            assert!(result.decision.unwrap().used_fallback);
        }

        let state = dispatcher.breaker_state();
        assert_eq!(state.consecutive_failures, 3);
        assert!(state.open);

        // Open breaker short-circuits prediction entirely.
        let calls_before = predictor.calls();
        let result = dispatcher.dispatch_task(&task).await;
        assert_eq!(
            result.decision.unwrap().reason,
            DecisionReason::FallbackCircuitBreaker
        );
        assert_eq!(predictor.calls(), calls_before);

        // After the probe interval one attempt goes through; a success
        // closes the breaker again.
        predictor.set_failing(false);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let result = dispatcher.dispatch_task(&task).await;
        let decision = result.decision.unwrap();
        assert_eq!(decision.reason, DecisionReason::Prediction);
        let state = dispatcher.breaker_state();
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.open);
    }

    #[tokio::test]
    async fn test_predictor_failures_fall_back_round_robin() {
        let registry = registry_with_workers(&["w1", "w2"]);
        let predictor = Arc::new(FailingPredictor::new());
        let config = DispatchConfig {
            fallback_threshold: 10,
            probe_interval_ms: 30_000,
            ..Default::default()
        };
        let (dispatcher, _stream, publisher) =
            dispatcher_with(predictor, registry, config);

        let task = TaskBuilder::new("t1", "etl").build();
        let mut workers = Vec::new();
        for _ in 0..4 {
            let result = dispatcher.dispatch_task(&task).await;
            let decision = result.decision.unwrap();
            assert_eq!(decision.reason, DecisionReason::FallbackRoundRobin);
            workers.push(decision.worker_id);
        }
        // Round-robin alternates over the two workers.
        assert_eq!(workers, vec!["w1", "w2", "w1", "w2"]);
        assert_eq!(publisher.published().len(), 4);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_entry_unacked_then_redelivery_succeeds() {
        let registry = registry_with_workers(&["w1"]);
        let predictor = Arc::new(FixedPredictor::new(1000.0, 0.9));
        let (dispatcher, stream, publisher) =
            dispatcher_with(predictor, registry, DispatchConfig::default());

        publisher.set_failing(true);
        stream.push(task_fields("t1", "etl"));
        let envelope = stream
            .read_batch(10, Duration::from_millis(10))
            .await
            .unwrap()
            .remove(0);
        let result = dispatcher.process_envelope(envelope).await;

        assert!(!result.success);
        assert!(result.decision.is_some());
        assert!(result.error.is_some());
        assert_eq!(stream.unacked_len(), 1);

        // Redelivery with a healthy publisher acks normally.
        publisher.set_failing(false);
        stream.redeliver_unacked();
        let envelope = stream
            .read_batch(10, Duration::from_millis(10))
            .await
            .unwrap()
            .remove(0);
        let result = dispatcher.process_envelope(envelope).await;
        assert!(result.success);
        assert_eq!(stream.unacked_len(), 0);
        assert_eq!(publisher.published_on("dispatch:w1").len(), 1);
    }

    #[tokio::test]
    async fn test_no_workers_leaves_entry_unacked() {
        let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(30)));
        let predictor = Arc::new(FixedPredictor::new(1000.0, 0.9));
        let (dispatcher, stream, _publisher) =
            dispatcher_with(predictor, registry, DispatchConfig::default());

        stream.push(task_fields("t1", "etl"));
        let envelope = stream
            .read_batch(10, Duration::from_millis(10))
            .await
            .unwrap()
            .remove(0);
        let result = dispatcher.process_envelope(envelope).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No workers available"));
        assert_eq!(stream.unacked_len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_task_is_acked_and_dropped() {
        let registry = registry_with_workers(&["w1"]);
        let predictor = Arc::new(FixedPredictor::new(1000.0, 0.9));
        let (dispatcher, stream, publisher) =
            dispatcher_with(predictor, registry, DispatchConfig::default());

        let mut fields = task_fields("t1", "etl");
        fields.insert("payload".to_string(), "{broken".to_string());
        stream.push(fields);

        let envelope = stream
            .read_batch(10, Duration::from_millis(10))
            .await
            .unwrap()
            .remove(0);
        let result = dispatcher.process_envelope(envelope).await;

        assert!(!result.success);
        assert!(result.decision.is_none());
        // Acked despite the failure: poison messages are drained, not retried.
        assert_eq!(stream.unacked_len(), 0);
        assert!(publisher.published().is_empty());
        assert_eq!(dispatcher.stats().metrics.malformed_tasks, 1);
    }

    #[tokio::test]
    async fn test_lowest_load_fallback_strategy_config() {
        let registry = registry_with_workers(&["w1", "w2"]);
        registry.update_load("w1", 0.8).unwrap();
        registry.update_load("w2", 0.2).unwrap();

        let predictor = Arc::new(FailingPredictor::new());
        let config = DispatchConfig {
            fallback_threshold: 10,
            probe_interval_ms: 30_000,
            fallback_strategy: "lowest_load".to_string(),
        };
        let (dispatcher, _stream, _publisher) = dispatcher_with(predictor, registry, config);

        let task = TaskBuilder::new("t1", "etl").build();
        for _ in 0..3 {
            let result = dispatcher.dispatch_task(&task).await;
            let decision = result.decision.unwrap();
            assert!(decision.used_fallback);
            assert_eq!(decision.worker_id, "w2");
        }
    }

    #[tokio::test]
    async fn test_decision_worker_always_from_available_set() {
        let registry = registry_with_workers(&["w1", "w2", "w3"]);
        registry
            .update_status("w1", foresight_domain::models::WorkerStatus::Draining)
            .unwrap();
        let predictor = Arc::new(FixedPredictor::new(1000.0, 0.9));
        let (dispatcher, _stream, _publisher) =
            dispatcher_with(predictor, registry.clone(), DispatchConfig::default());

        let task = TaskBuilder::new("t1", "etl").build();
        for _ in 0..6 {
            let result = dispatcher.dispatch_task(&task).await;
            let decision = result.decision.unwrap();
            let available: Vec<String> = registry
                .available(&[])
                .into_iter()
                .map(|w| w.id)
                .collect();
            assert!(available.contains(&decision.worker_id));
            assert_ne!(decision.worker_id, "w1");
        }
    }
}
