use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-task-type exponential-moving-average duration state.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaState {
    pub task_type: String,
    pub ema_duration_ms: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl EmaState {
    pub fn first_sample(task_type: &str, duration_ms: f64) -> Self {
        Self {
            task_type: task_type.to_string(),
            ema_duration_ms: duration_ms,
            sample_count: 1,
            last_updated: Utc::now(),
        }
    }
}

/// Duration estimate handed to the scorer for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPrediction {
    pub task_id: String,
    pub estimated_duration_ms: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_worker: Option<String>,
}

/// Persisted form of one EMA entry, keyed by task type in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmaEntry {
    pub ema: f64,
    #[serde(rename = "sampleCount")]
    pub sample_count: u64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

/// The single-key JSON blob written to the prediction store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub version: u32,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
    pub predictions: HashMap<String, EmaEntry>,
}

pub const SNAPSHOT_VERSION: u32 = 1;

impl PredictionSnapshot {
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a EmaState>,
    {
        let predictions = states
            .into_iter()
            .map(|s| {
                (
                    s.task_type.clone(),
                    EmaEntry {
                        ema: s.ema_duration_ms,
                        sample_count: s.sample_count,
                        last_updated: s.last_updated,
                    },
                )
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            predictions,
        }
    }

    pub fn into_states(self) -> HashMap<String, EmaState> {
        self.predictions
            .into_iter()
            .map(|(task_type, entry)| {
                let state = EmaState {
                    task_type: task_type.clone(),
                    ema_duration_ms: entry.ema,
                    sample_count: entry.sample_count,
                    last_updated: entry.last_updated,
                };
                (task_type, state)
            })
            .collect()
    }
}
