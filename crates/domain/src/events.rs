//! Domain events emitted by the heartbeat subscriber and the feedback
//! pipeline. Delivered on bounded channels; consumers decide fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker health and load transitions observed by the heartbeat subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerLifecycleEvent {
    WorkerHealthy {
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    WorkerDegraded {
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    WorkerUnhealthy {
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    WorkerRemoved {
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    WorkerLoadChanged {
        worker_id: String,
        previous_load: f64,
        current_load: f64,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkerLifecycleEvent {
    pub fn healthy(worker_id: &str) -> Self {
        Self::WorkerHealthy {
            worker_id: worker_id.to_string(),
            occurred_at: Utc::now(),
        }
    }
    pub fn degraded(worker_id: &str) -> Self {
        Self::WorkerDegraded {
            worker_id: worker_id.to_string(),
            occurred_at: Utc::now(),
        }
    }
    pub fn unhealthy(worker_id: &str) -> Self {
        Self::WorkerUnhealthy {
            worker_id: worker_id.to_string(),
            occurred_at: Utc::now(),
        }
    }
    pub fn removed(worker_id: &str) -> Self {
        Self::WorkerRemoved {
            worker_id: worker_id.to_string(),
            occurred_at: Utc::now(),
        }
    }
    pub fn load_changed(worker_id: &str, previous_load: f64, current_load: f64) -> Self {
        Self::WorkerLoadChanged {
            worker_id: worker_id.to_string(),
            previous_load,
            current_load,
            occurred_at: Utc::now(),
        }
    }

    pub fn worker_id(&self) -> &str {
        match self {
            Self::WorkerHealthy { worker_id, .. }
            | Self::WorkerDegraded { worker_id, .. }
            | Self::WorkerUnhealthy { worker_id, .. }
            | Self::WorkerRemoved { worker_id, .. }
            | Self::WorkerLoadChanged { worker_id, .. } => worker_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkerHealthy { .. } => "worker_healthy",
            Self::WorkerDegraded { .. } => "worker_degraded",
            Self::WorkerUnhealthy { .. } => "worker_unhealthy",
            Self::WorkerRemoved { .. } => "worker_removed",
            Self::WorkerLoadChanged { .. } => "worker_load_changed",
        }
    }
}

/// How far outside the drift band a completion landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    Minor,
    Major,
}

/// Events produced while closing the prediction feedback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedbackEvent {
    DriftDetected {
        task_type: String,
        predicted_ms: f64,
        actual_ms: f64,
        ratio: f64,
        severity: DriftSeverity,
        occurred_at: DateTime<Utc>,
    },
    PredictionUpdated {
        task_type: String,
        ema_duration_ms: f64,
        sample_count: u64,
        occurred_at: DateTime<Utc>,
    },
    AccuracyWarning {
        accuracy: f64,
        window_len: usize,
        occurred_at: DateTime<Utc>,
    },
}

impl FeedbackEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DriftDetected { .. } => "drift_detected",
            Self::PredictionUpdated { .. } => "prediction_updated",
            Self::AccuracyWarning { .. } => "accuracy_warning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event = WorkerLifecycleEvent::unhealthy("w1");
        assert_eq!(event.event_type(), "worker_unhealthy");
        assert_eq!(event.worker_id(), "w1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "worker_unhealthy");
    }

    #[test]
    fn test_feedback_event_tags() {
        let event = FeedbackEvent::AccuracyWarning {
            accuracy: 0.5,
            window_len: 200,
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "accuracy_warning");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "accuracy_warning");
    }

    #[test]
    fn test_drift_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DriftSeverity::Minor).unwrap(),
            "\"minor\""
        );
        assert_eq!(
            serde_json::to_string(&DriftSeverity::Major).unwrap(),
            "\"major\""
        );
    }
}
