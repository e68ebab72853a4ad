use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use foresight_config::HealthConfig;
use foresight_domain::events::WorkerLifecycleEvent;
use foresight_domain::models::{HeartbeatRecord, WorkerCapacity, WorkerHealth, WorkerStatus};

use crate::availability;
use crate::registry::WorkerRegistry;

/// Derived capacity snapshots per worker, shared between the heartbeat
/// subscriber (writer) and the feedback pipeline (duration samples).
pub struct CapacityTracker {
    inner: RwLock<HashMap<String, WorkerCapacity>>,
    default_avg_ms: f64,
}

impl CapacityTracker {
    pub fn new(default_avg_ms: f64) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            default_avg_ms,
        }
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerCapacity> {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(worker_id).cloned())
    }

    /// Rolling average task duration, seeded from configuration until the
    /// first completion arrives.
    pub fn avg_duration_ms(&self, worker_id: &str) -> f64 {
        self.get(worker_id)
            .map(|c| c.avg_task_duration_ms)
            .unwrap_or(self.default_avg_ms)
    }

    pub fn upsert(&self, capacity: WorkerCapacity) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(capacity.worker_id.clone(), capacity);
        }
    }

    pub fn set_health(&self, worker_id: &str, health: WorkerHealth) {
        if let Ok(mut m) = self.inner.write() {
            if let Some(capacity) = m.get_mut(worker_id) {
                capacity.health = health;
            }
        }
    }

    /// Fold a completed task's duration into the worker's rolling average.
    /// Unknown workers (no heartbeat seen yet) are ignored.
    pub fn record_task_duration(&self, worker_id: &str, duration_ms: f64) {
        if let Ok(mut m) = self.inner.write() {
            if let Some(capacity) = m.get_mut(worker_id) {
                capacity.avg_task_duration_ms =
                    availability::rolling_avg_duration(capacity.avg_task_duration_ms, duration_ms);
            }
        }
    }

    pub fn remove(&self, worker_id: &str) {
        if let Ok(mut m) = self.inner.write() {
            m.remove(worker_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumes worker telemetry, keeps the registry and capacity map current,
/// and reaps workers whose heartbeats go stale.
///
/// All mutations happen on one task, so readers always observe a consistent
/// snapshot of registry plus capacity.
pub struct HeartbeatSubscriber {
    registry: Arc<WorkerRegistry>,
    capacity: Arc<CapacityTracker>,
    events: mpsc::Sender<WorkerLifecycleEvent>,
    config: HealthConfig,
    running: AtomicBool,
}

impl HeartbeatSubscriber {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        capacity: Arc<CapacityTracker>,
        config: HealthConfig,
        events: mpsc::Sender<WorkerLifecycleEvent>,
    ) -> Self {
        Self {
            registry,
            capacity,
            events,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run the record pump and the periodic reaper on one task until the
    /// upstream ends, `stop` is called, or shutdown is broadcast.
    pub fn start(
        self: Arc<Self>,
        mut records: mpsc::Receiver<HeartbeatRecord>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let subscriber = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(
                subscriber.config.health_check_interval_ms,
            ));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("heartbeat subscriber started");

            loop {
                if !subscriber.running.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("heartbeat subscriber shutting down");
                        break;
                    }
                    maybe = records.recv() => match maybe {
                        Some(record) => subscriber.handle_record(&record),
                        None => {
                            info!("heartbeat stream ended");
                            break;
                        }
                    },
                    _ = ticker.tick() => subscriber.reap_once(),
                }
            }
            subscriber.running.store(false, Ordering::SeqCst);
            info!("heartbeat subscriber stopped");
        })
    }

    /// Idempotent: stopping twice is a no-op.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Apply one telemetry record. Heartbeats for workers the registry does
    /// not know are ignored.
    pub fn handle_record(&self, record: &HeartbeatRecord) {
        let Some(previous) = self.registry.get(&record.worker_id) else {
            debug!(worker_id = %record.worker_id, "heartbeat for unknown worker, ignoring");
            return;
        };

        let load = availability::current_load(record.cpu_usage, record.memory_usage);
        let avg_ms = self.capacity.avg_duration_ms(&record.worker_id);
        // A heartbeat we are holding right now has age zero; health can only
        // be healthy or degraded on this path.
        let health = availability::classify_health(Duration::ZERO, load, &self.config);
        let previous_health = self.capacity.get(&record.worker_id).map(|c| c.health);

        let now = Utc::now();
        self.capacity.upsert(WorkerCapacity {
            worker_id: record.worker_id.clone(),
            queue_depth: record.queue_depth,
            estimated_free_at: availability::estimated_free_at(now, record.queue_depth, avg_ms),
            health,
            avg_task_duration_ms: avg_ms,
        });

        if let Err(e) =
            self.registry
                .heartbeat(&record.worker_id, load, record.queue_depth, record.timestamp())
        {
            debug!(worker_id = %record.worker_id, "heartbeat touch failed: {e}");
            return;
        }

        if previous_health != Some(health) {
            self.emit(match health {
                WorkerHealth::Healthy => WorkerLifecycleEvent::healthy(&record.worker_id),
                WorkerHealth::Degraded => WorkerLifecycleEvent::degraded(&record.worker_id),
                WorkerHealth::Unhealthy => WorkerLifecycleEvent::unhealthy(&record.worker_id),
                WorkerHealth::Removed => WorkerLifecycleEvent::removed(&record.worker_id),
            });
        }

        if availability::is_significant_load_change(previous.current_load, load) {
            self.emit(WorkerLifecycleEvent::load_changed(
                &record.worker_id,
                previous.current_load,
                load,
            ));
        }
    }

    /// One reaper pass over every worker's heartbeat age.
    ///
    /// Unhealthy-aged workers are forced offline, once per transition.
    /// Removed-aged workers are deleted from both maps, emitting exactly one
    /// removed event because deletion makes the check unrepeatable.
    pub fn reap_once(&self) {
        for (worker_id, age) in self.registry.heartbeat_ages() {
            let age_ms = age.as_millis() as u64;
            if age_ms >= self.config.removed_timeout_ms {
                match self.registry.remove(&worker_id) {
                    Ok(Some(_)) => {
                        self.capacity.remove(&worker_id);
                        warn!(worker_id = %worker_id, age_ms, "worker removed after heartbeat silence");
                        self.emit(WorkerLifecycleEvent::removed(&worker_id));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(worker_id = %worker_id, "failed to remove worker: {e}"),
                }
            } else if age_ms >= self.config.unhealthy_timeout_ms {
                let Some(state) = self.registry.get(&worker_id) else {
                    continue;
                };
                if state.status != WorkerStatus::Offline {
                    if let Err(e) = self.registry.update_status(&worker_id, WorkerStatus::Offline)
                    {
                        warn!(worker_id = %worker_id, "failed to mark worker offline: {e}");
                        continue;
                    }
                    self.capacity.set_health(&worker_id, WorkerHealth::Unhealthy);
                    warn!(worker_id = %worker_id, age_ms, "worker unhealthy, marked offline");
                    self.emit(WorkerLifecycleEvent::unhealthy(&worker_id));
                }
            }
        }
    }

    fn emit(&self, event: WorkerLifecycleEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("dropping worker lifecycle event, channel full or closed: {e}");
        }
    }
}
