use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foresight_errors::SchedulerResult;

use super::task::Task;

/// A task completion reported by a worker on the completion stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub task_id: String,
    pub task_type: String,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_duration_ms: Option<f64>,
}

/// Payload published on the per-worker dispatch channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAssignment {
    pub task_id: String,
    pub task: Task,
    pub assigned_at: DateTime<Utc>,
}

impl DispatchAssignment {
    pub fn new(task: Task, assigned_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id.clone(),
            task,
            assigned_at,
        }
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
