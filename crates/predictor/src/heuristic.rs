use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use foresight_config::PredictionConfig;
use foresight_domain::models::{EmaState, PredictionSnapshot, Task, TaskPrediction};
use foresight_domain::ports::{DurationPredictor, PredictionStore};
use foresight_errors::{SchedulerError, SchedulerResult};

use crate::ema;

/// Per-task-type EMA duration predictor.
///
/// The whole state lives in memory; the store only receives snapshot copies,
/// written every `snapshot_interval` feedback updates and once on shutdown.
/// `predict` is a lock-guarded map lookup and never touches the store.
pub struct HeuristicPredictor {
    state: RwLock<HashMap<String, EmaState>>,
    store: Arc<dyn PredictionStore>,
    config: PredictionConfig,
    updates_since_snapshot: AtomicU64,
}

impl HeuristicPredictor {
    pub fn new(store: Arc<dyn PredictionStore>, config: PredictionConfig) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            store,
            config,
            updates_since_snapshot: AtomicU64::new(0),
        }
    }

    /// Construct and attempt to restore persisted state. A load failure is
    /// logged and leaves the predictor empty; it still serves defaults.
    pub async fn with_warm_start(store: Arc<dyn PredictionStore>, config: PredictionConfig) -> Self {
        let predictor = Self::new(store, config);
        match predictor.store.load().await {
            Ok(Some(snapshot)) => {
                let states = snapshot.into_states();
                info!(task_types = states.len(), "restored predictor state");
                if let Ok(mut guard) = predictor.state.write() {
                    *guard = states;
                }
            }
            Ok(None) => {
                info!("no persisted predictor state, starting cold");
            }
            Err(e) => {
                warn!("failed to load predictor state, starting cold: {e}");
            }
        }
        predictor
    }

    /// Snapshot the current state for persistence or inspection.
    pub fn snapshot(&self) -> SchedulerResult<PredictionSnapshot> {
        let guard = self
            .state
            .read()
            .map_err(|_| SchedulerError::Internal("predictor state lock poisoned".to_string()))?;
        Ok(PredictionSnapshot::from_states(guard.values()))
    }

    /// Persist the full state under the configured key.
    pub async fn persist_now(&self) -> SchedulerResult<()> {
        let snapshot = self.snapshot()?;
        self.store.save(&snapshot).await?;
        debug!(
            task_types = snapshot.predictions.len(),
            "persisted predictor snapshot"
        );
        Ok(())
    }

    /// Operator reset: drop all learned state and the snapshot counter.
    pub fn reset(&self) -> SchedulerResult<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| SchedulerError::Internal("predictor state lock poisoned".to_string()))?;
        guard.clear();
        self.updates_since_snapshot.store(0, Ordering::Release);
        info!("predictor state reset");
        Ok(())
    }

    pub fn tracked_types(&self) -> usize {
        self.state.read().map(|g| g.len()).unwrap_or(0)
    }

    fn apply_feedback(&self, task_type: &str, actual_ms: f64) -> SchedulerResult<EmaState> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| SchedulerError::Internal("predictor state lock poisoned".to_string()))?;
        let state = guard
            .entry(task_type.to_string())
            .and_modify(|s| {
                s.ema_duration_ms = ema::blend(s.ema_duration_ms, actual_ms, self.config.alpha);
                s.sample_count += 1;
                s.last_updated = Utc::now();
            })
            .or_insert_with(|| EmaState::first_sample(task_type, actual_ms));
        Ok(state.clone())
    }
}

#[async_trait]
impl DurationPredictor for HeuristicPredictor {
    fn predict(&self, task: &Task) -> SchedulerResult<Option<TaskPrediction>> {
        let guard = self
            .state
            .read()
            .map_err(|_| SchedulerError::Internal("predictor state lock poisoned".to_string()))?;

        let prediction = match guard.get(&task.task_type) {
            Some(state) => TaskPrediction {
                task_id: task.id.clone(),
                estimated_duration_ms: state.ema_duration_ms,
                confidence: ema::confidence(state.sample_count, self.config.confidence_threshold),
                recommended_worker: None,
            },
            None => TaskPrediction {
                task_id: task.id.clone(),
                estimated_duration_ms: self.config.default_duration_ms as f64,
                confidence: 0.0,
                recommended_worker: None,
            },
        };
        Ok(Some(prediction))
    }

    async fn feedback(
        &self,
        task_type: &str,
        actual_duration_ms: u64,
    ) -> SchedulerResult<Option<EmaState>> {
        if task_type.trim().is_empty() {
            return Err(SchedulerError::invalid_task(
                "feedback requires a non-empty task type",
            ));
        }

        let updated = self.apply_feedback(task_type, actual_duration_ms as f64)?;

        let updates = self.updates_since_snapshot.fetch_add(1, Ordering::AcqRel) + 1;
        if updates >= self.config.snapshot_interval {
            self.updates_since_snapshot.store(0, Ordering::Release);
            // Persistence failures never fail feedback.
            if let Err(e) = self.persist_now().await {
                warn!("predictor snapshot failed, continuing in-memory: {e}");
            }
        }

        Ok(Some(updated))
    }

    fn ready(&self) -> bool {
        true
    }
}
