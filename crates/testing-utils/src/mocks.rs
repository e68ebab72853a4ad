//! In-memory mock implementations of the domain ports, with failure
//! injection knobs for exercising degraded paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use foresight_domain::models::{EmaState, PredictionSnapshot, Task, TaskPrediction};
use foresight_domain::ports::{DispatchPublisher, DurationPredictor, PredictionStore};
use foresight_errors::{SchedulerError, SchedulerResult};

/// Prediction store backed by a single in-memory slot.
#[derive(Default)]
pub struct MemoryPredictionStore {
    snapshot: Mutex<Option<PredictionSnapshot>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn stored(&self) -> Option<PredictionSnapshot> {
        self.snapshot.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn load(&self) -> SchedulerResult<Option<PredictionSnapshot>> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(SchedulerError::persistence("injected load failure"));
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &PredictionSnapshot) -> SchedulerResult<()> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(SchedulerError::persistence("injected save failure"));
        }
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Predictor that always errors; drives the circuit breaker in tests.
#[derive(Default)]
pub struct FailingPredictor {
    calls: AtomicU64,
}

impl FailingPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DurationPredictor for FailingPredictor {
    fn predict(&self, _task: &Task) -> SchedulerResult<Option<TaskPrediction>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(SchedulerError::prediction("injected predictor failure"))
    }

    async fn feedback(
        &self,
        _task_type: &str,
        _actual_duration_ms: u64,
    ) -> SchedulerResult<Option<EmaState>> {
        Err(SchedulerError::prediction("injected predictor failure"))
    }

    fn ready(&self) -> bool {
        false
    }
}

/// Predictor returning a canned estimate for every task. Optionally flips
/// into failure mode mid-test.
pub struct FixedPredictor {
    estimated_duration_ms: f64,
    confidence: f64,
    failing: AtomicBool,
    calls: AtomicU64,
}

impl FixedPredictor {
    pub fn new(estimated_duration_ms: f64, confidence: f64) -> Self {
        Self {
            estimated_duration_ms,
            confidence,
            failing: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DurationPredictor for FixedPredictor {
    fn predict(&self, task: &Task) -> SchedulerResult<Option<TaskPrediction>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(SchedulerError::prediction("injected predictor failure"));
        }
        Ok(Some(TaskPrediction {
            task_id: task.id.clone(),
            estimated_duration_ms: self.estimated_duration_ms,
            confidence: self.confidence,
            recommended_worker: None,
        }))
    }

    async fn feedback(
        &self,
        _task_type: &str,
        _actual_duration_ms: u64,
    ) -> SchedulerResult<Option<EmaState>> {
        Ok(None)
    }

    fn ready(&self) -> bool {
        true
    }
}

/// Publisher that records every publish and can be switched into failure
/// mode to exercise the unacked-redelivery path.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl DispatchPublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(SchedulerError::message_queue("injected publish failure"));
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}
