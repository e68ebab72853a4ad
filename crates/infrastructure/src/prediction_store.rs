use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use foresight_domain::models::PredictionSnapshot;
use foresight_domain::ports::PredictionStore;
use foresight_errors::{SchedulerError, SchedulerResult};

use crate::redis_stream::RedisConnectionManager;

/// Predictor snapshot persistence under a single Redis key.
pub struct RedisPredictionStore {
    connection: Arc<RedisConnectionManager>,
    key: String,
}

impl RedisPredictionStore {
    pub fn new(connection: Arc<RedisConnectionManager>, key: impl Into<String>) -> Self {
        Self {
            connection,
            key: key.into(),
        }
    }
}

#[async_trait]
impl PredictionStore for RedisPredictionStore {
    async fn load(&self) -> SchedulerResult<Option<PredictionSnapshot>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(&self.key);
        let raw: Option<String> = self
            .connection
            .execute_command(&cmd)
            .await
            .map_err(|e| SchedulerError::persistence(format!("snapshot load failed: {e}")))?;

        match raw {
            Some(json) => {
                let snapshot: PredictionSnapshot = serde_json::from_str(&json).map_err(|e| {
                    SchedulerError::persistence(format!("snapshot is not valid JSON: {e}"))
                })?;
                debug!(key = %self.key, task_types = snapshot.predictions.len(), "loaded predictor snapshot");
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &PredictionSnapshot) -> SchedulerResult<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| SchedulerError::persistence(format!("snapshot encode failed: {e}")))?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&self.key).arg(&json);
        let _: String = self
            .connection
            .execute_command(&cmd)
            .await
            .map_err(|e| SchedulerError::persistence(format!("snapshot save failed: {e}")))?;
        debug!(key = %self.key, bytes = json.len(), "saved predictor snapshot");
        Ok(())
    }
}
