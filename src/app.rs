use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use foresight_config::{AppConfig, StreamBackend};
use foresight_dispatcher::{
    CapacityTracker, DispatcherStats, FeedbackProcessor, HeartbeatSubscriber, TaskDispatcher,
    WorkerRegistry,
};
use foresight_domain::events::{FeedbackEvent, WorkerLifecycleEvent};
use foresight_domain::models::{CompletionEvent, HeartbeatRecord};
use foresight_domain::ports::{DispatchPublisher, DurationPredictor, PredictionStore, TaskStream};
use foresight_infrastructure::{
    InMemoryDispatchChannels, InMemoryPredictionStore, InMemoryTaskStream, RedisPredictionStore,
    RedisStreamTransport, RedisTelemetrySources,
};
use foresight_predictor::HeuristicPredictor;

use crate::shutdown::ShutdownManager;

const TELEMETRY_CHANNEL_CAPACITY: usize = 1024;
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct InboundChannels {
    heartbeats: mpsc::Receiver<HeartbeatRecord>,
    completions: mpsc::Receiver<CompletionEvent>,
    worker_events: mpsc::Receiver<WorkerLifecycleEvent>,
    feedback_events: mpsc::Receiver<FeedbackEvent>,
}

/// Handles onto the in-memory transport, for embedded deployments that run
/// submitters and workers in the same process.
#[derive(Clone)]
pub struct InMemoryHandles {
    pub task_stream: Arc<InMemoryTaskStream>,
    pub dispatch_channels: Arc<InMemoryDispatchChannels>,
}

/// Fully wired scheduler: transport, registry, predictor, dispatcher and
/// the two subscribers, sharing one shutdown fan-out.
pub struct Application {
    registry: Arc<WorkerRegistry>,
    predictor: Arc<HeuristicPredictor>,
    dispatcher: Arc<TaskDispatcher>,
    heartbeat_subscriber: Arc<HeartbeatSubscriber>,
    feedback_processor: Arc<FeedbackProcessor>,
    telemetry_sources: Option<RedisTelemetrySources>,
    heartbeat_tx: mpsc::Sender<HeartbeatRecord>,
    completion_tx: mpsc::Sender<CompletionEvent>,
    inbound: Mutex<Option<InboundChannels>>,
    in_memory: Option<InMemoryHandles>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let registry = Arc::new(WorkerRegistry::new(Duration::from_millis(
            config.health.heartbeat_timeout_ms,
        )));
        let capacity = Arc::new(CapacityTracker::new(config.health.avg_task_duration_ms as f64));

        let (heartbeat_tx, heartbeats) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        let (completion_tx, completions) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        let (worker_events_tx, worker_events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (feedback_events_tx, feedback_events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task_stream: Arc<dyn TaskStream>;
        let publisher: Arc<dyn DispatchPublisher>;
        let store: Arc<dyn PredictionStore>;
        let mut telemetry_sources = None;
        let mut in_memory = None;

        match config.stream.backend {
            StreamBackend::Redis => {
                let transport = Arc::new(
                    RedisStreamTransport::new(config.stream.clone())
                        .await
                        .context("failed to connect to the task stream")?,
                );
                let connection = transport.connection();
                store = Arc::new(RedisPredictionStore::new(
                    connection.clone(),
                    config.prediction.persistence_key.clone(),
                ));
                telemetry_sources =
                    Some(RedisTelemetrySources::new(connection, config.stream.clone()));
                task_stream = transport.clone();
                publisher = transport;
            }
            StreamBackend::InMemory => {
                let stream = Arc::new(InMemoryTaskStream::new());
                let channels = Arc::new(InMemoryDispatchChannels::new());
                store = Arc::new(InMemoryPredictionStore::new());
                task_stream = stream.clone();
                publisher = channels.clone();
                in_memory = Some(InMemoryHandles {
                    task_stream: stream,
                    dispatch_channels: channels,
                });
            }
        }

        let predictor =
            Arc::new(HeuristicPredictor::with_warm_start(store, config.prediction.clone()).await);

        let dispatcher = Arc::new(TaskDispatcher::new(
            task_stream,
            publisher,
            registry.clone(),
            predictor.clone() as Arc<dyn DurationPredictor>,
            config.stream.clone(),
            config.dispatch.clone(),
            config.scoring.clone(),
        ));

        let heartbeat_subscriber = Arc::new(HeartbeatSubscriber::new(
            registry.clone(),
            capacity.clone(),
            config.health.clone(),
            worker_events_tx,
        ));

        let feedback_processor = Arc::new(FeedbackProcessor::new(
            predictor.clone() as Arc<dyn DurationPredictor>,
            capacity,
            config.feedback.clone(),
            feedback_events_tx,
        ));

        Ok(Self {
            registry,
            predictor,
            dispatcher,
            heartbeat_subscriber,
            feedback_processor,
            telemetry_sources,
            heartbeat_tx,
            completion_tx,
            inbound: Mutex::new(Some(InboundChannels {
                heartbeats,
                completions,
                worker_events,
                feedback_events,
            })),
            in_memory,
        })
    }

    /// Run until shutdown. Spawns the telemetry pumps and subscribers, then
    /// drives the dispatch loop on this task; a final predictor snapshot is
    /// written after the loop stops.
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        let inbound = self
            .inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .context("application is already running")?;

        if let Some(sources) = &self.telemetry_sources {
            sources
                .ensure_groups()
                .await
                .context("failed to prepare telemetry consumer groups")?;
            sources.spawn_heartbeat_pump(self.heartbeat_tx.clone(), shutdown.subscribe().await);
            sources.spawn_completion_pump(self.completion_tx.clone(), shutdown.subscribe().await);
        }

        self.heartbeat_subscriber
            .clone()
            .start(inbound.heartbeats, shutdown.subscribe().await);
        self.feedback_processor
            .clone()
            .start(inbound.completions, shutdown.subscribe().await);
        spawn_event_logger(
            inbound.worker_events,
            inbound.feedback_events,
            shutdown.subscribe().await,
        );

        let result = self.dispatcher.run(shutdown.subscribe().await).await;

        if let Err(e) = self.predictor.persist_now().await {
            warn!("final predictor snapshot failed: {e}");
        }
        result?;
        Ok(())
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    pub fn predictor(&self) -> Arc<HeuristicPredictor> {
        self.predictor.clone()
    }

    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Feed a heartbeat as the telemetry stream would.
    pub fn heartbeat_sender(&self) -> mpsc::Sender<HeartbeatRecord> {
        self.heartbeat_tx.clone()
    }

    /// Feed a completion as the completion stream would.
    pub fn completion_sender(&self) -> mpsc::Sender<CompletionEvent> {
        self.completion_tx.clone()
    }

    /// Present only when the in-memory backend is configured.
    pub fn in_memory_handles(&self) -> Option<InMemoryHandles> {
        self.in_memory.clone()
    }
}

fn spawn_event_logger(
    mut worker_events: mpsc::Receiver<WorkerLifecycleEvent>,
    mut feedback_events: mpsc::Receiver<FeedbackEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(event) = worker_events.recv() => {
                    info!(
                        event = event.event_type(),
                        worker_id = event.worker_id(),
                        "worker lifecycle event"
                    );
                }
                Some(event) = feedback_events.recv() => {
                    info!(event = event.event_type(), "feedback event");
                }
                else => break,
            }
        }
    })
}
