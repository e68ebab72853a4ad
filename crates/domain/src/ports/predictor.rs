use async_trait::async_trait;

use foresight_errors::SchedulerResult;

use crate::models::{EmaState, Task, TaskPrediction};

/// A duration prediction strategy.
///
/// `predict` runs on the dispatch hot path: it must not block, suspend or
/// perform I/O. `feedback` may persist state and is therefore async; it
/// returns the updated per-type state when the strategy tracks one.
#[async_trait]
pub trait DurationPredictor: Send + Sync {
    fn predict(&self, task: &Task) -> SchedulerResult<Option<TaskPrediction>>;

    async fn feedback(
        &self,
        task_type: &str,
        actual_duration_ms: u64,
    ) -> SchedulerResult<Option<EmaState>>;

    fn ready(&self) -> bool;
}

/// Identity predictor: never predicts, accepts feedback silently.
/// Used for bootstrap wiring and as a neutral element in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPredictor;

#[async_trait]
impl DurationPredictor for NoOpPredictor {
    fn predict(&self, _task: &Task) -> SchedulerResult<Option<TaskPrediction>> {
        Ok(None)
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
