use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prediction::TaskPrediction;

/// Why a worker was chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Prediction,
    FallbackRoundRobin,
    FallbackCircuitBreaker,
}

/// The outcome of selecting a worker for one task.
///
/// `reason == Prediction` implies `used_fallback == false`; the fallback
/// reasons imply the opposite. The constructors are the only way decisions
/// are built, which keeps that pairing intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingDecision {
    pub task_id: String,
    pub worker_id: String,
    pub decided_at: DateTime<Utc>,
    pub used_fallback: bool,
    pub reason: DecisionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<TaskPrediction>,
}

impl SchedulingDecision {
    pub fn predicted(task_id: &str, worker_id: &str, prediction: TaskPrediction) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            decided_at: Utc::now(),
            used_fallback: false,
            reason: DecisionReason::Prediction,
            prediction: Some(prediction),
        }
    }

    pub fn fallback(task_id: &str, worker_id: &str, reason: DecisionReason) -> Self {
        debug_assert!(!matches!(reason, DecisionReason::Prediction));
        Self {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            decided_at: Utc::now(),
            used_fallback: true,
            reason,
            prediction: None,
        }
    }
}

/// Result record surfaced for every dispatched stream message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<SchedulingDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn dispatched(decision: SchedulingDecision) -> Self {
        Self {
            success: true,
            decision: Some(decision),
            error: None,
        }
    }

    /// Publish failed: the decision stands but the message stays unacked.
    pub fn publish_failed(decision: SchedulingDecision, error: String) -> Self {
        Self {
            success: false,
            decision: Some(decision),
            error: Some(error),
        }
    }

    pub fn no_workers() -> Self {
        Self {
            success: false,
            decision: None,
            error: Some(foresight_errors::SchedulerError::NoWorkersAvailable.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionReason::FallbackCircuitBreaker).unwrap();
        assert_eq!(json, "\"fallback_circuit_breaker\"");
        let json = serde_json::to_string(&DecisionReason::Prediction).unwrap();
        assert_eq!(json, "\"prediction\"");
    }

    #[test]
    fn test_constructors_pin_fallback_flag() {
        let prediction = TaskPrediction {
            task_id: "t1".to_string(),
            estimated_duration_ms: 1000.0,
            confidence: 0.5,
            recommended_worker: Some("w1".to_string()),
        };
        let d = SchedulingDecision::predicted("t1", "w1", prediction);
        assert!(!d.used_fallback);
        assert_eq!(d.reason, DecisionReason::Prediction);
        assert!(d.prediction.is_some());

        let d = SchedulingDecision::fallback("t1", "w2", DecisionReason::FallbackRoundRobin);
        assert!(d.used_fallback);
        assert!(d.prediction.is_none());
    }

    #[test]
    fn test_no_workers_result() {
        let r = DispatchResult::no_workers();
        assert!(!r.success);
        assert!(r.decision.is_none());
        assert_eq!(r.error.as_deref(), Some("No workers available"));
    }
}
