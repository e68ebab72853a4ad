use async_trait::async_trait;

use foresight_errors::SchedulerResult;

use crate::models::PredictionSnapshot;

/// Key/value persistence for predictor state, written as one JSON blob.
///
/// Failures here are never fatal for the hot path; callers downgrade to
/// in-memory operation and log.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn load(&self) -> SchedulerResult<Option<PredictionSnapshot>>;
    async fn save(&self, snapshot: &PredictionSnapshot) -> SchedulerResult<()>;
}
