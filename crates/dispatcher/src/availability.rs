//! Pure functions mapping heartbeat telemetry to load, health class and
//! estimated availability. Everything here is deterministic in its inputs;
//! the caller supplies `now` and the heartbeat age.

use std::time::Duration;

use chrono::{DateTime, Utc};

use foresight_config::HealthConfig;
use foresight_domain::models::WorkerHealth;

/// CPU dominates the blended load figure.
const CPU_WEIGHT: f64 = 0.6;
const MEMORY_WEIGHT: f64 = 0.4;

/// Load at or above this is a degraded worker.
const DEGRADED_LOAD: f64 = 0.9;

/// Load deltas below this are noise and emit no event.
const SIGNIFICANT_LOAD_DELTA: f64 = 0.1;

/// Smoothing factor for the per-worker rolling task duration average.
pub const DURATION_SMOOTHING_ALPHA: f64 = 0.1;

pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Blended utilization from CPU and memory usage, each clamped to [0,1].
pub fn current_load(cpu_usage: f64, memory_usage: f64) -> f64 {
    CPU_WEIGHT * clamp_unit(cpu_usage) + MEMORY_WEIGHT * clamp_unit(memory_usage)
}

/// When the worker's queue would drain at its rolling average pace.
/// Never earlier than `now`.
pub fn estimated_free_at(
    now: DateTime<Utc>,
    queue_depth: u32,
    avg_task_duration_ms: f64,
) -> DateTime<Utc> {
    let backlog_ms = (queue_depth as f64 * avg_task_duration_ms.max(0.0)) as i64;
    now + chrono::Duration::milliseconds(backlog_ms.max(0))
}

/// Health classification, evaluated strictly in this order:
/// removed-age, unhealthy-age, degraded-load, healthy.
pub fn classify_health(heartbeat_age: Duration, load: f64, config: &HealthConfig) -> WorkerHealth {
    let age_ms = heartbeat_age.as_millis() as u64;
    if age_ms >= config.removed_timeout_ms {
        WorkerHealth::Removed
    } else if age_ms >= config.unhealthy_timeout_ms {
        WorkerHealth::Unhealthy
    } else if load >= DEGRADED_LOAD {
        WorkerHealth::Degraded
    } else {
        WorkerHealth::Healthy
    }
}

pub fn is_significant_load_change(previous: f64, current: f64) -> bool {
    (current - previous).abs() >= SIGNIFICANT_LOAD_DELTA
}

/// Fold one observed task duration into the rolling average.
pub fn rolling_avg_duration(current_avg_ms: f64, sample_ms: f64) -> f64 {
    DURATION_SMOOTHING_ALPHA * sample_ms + (1.0 - DURATION_SMOOTHING_ALPHA) * current_avg_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_load_blend() {
        assert_eq!(current_load(0.5, 0.5), 0.5);
        assert!((current_load(1.0, 0.0) - 0.6).abs() < 1e-9);
        assert!((current_load(0.0, 1.0) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_current_load_clamps_inputs() {
        assert_eq!(current_load(2.0, 2.0), 1.0);
        assert_eq!(current_load(-1.0, -1.0), 0.0);
    }

    #[test]
    fn test_estimated_free_at_never_before_now() {
        let now = Utc::now();
        assert_eq!(estimated_free_at(now, 0, 5000.0), now);
        let free_at = estimated_free_at(now, 3, 5000.0);
        assert_eq!((free_at - now).num_milliseconds(), 15_000);
        // Negative averages cannot push the estimate into the past.
        assert_eq!(estimated_free_at(now, 3, -100.0), now);
    }

    #[test]
    fn test_health_order_of_evaluation() {
        let config = HealthConfig::default();

        // Removed wins over everything else.
        assert_eq!(
            classify_health(Duration::from_secs(301), 0.95, &config),
            WorkerHealth::Removed
        );
        // Unhealthy age wins over degraded load.
        assert_eq!(
            classify_health(Duration::from_secs(31), 0.95, &config),
            WorkerHealth::Unhealthy
        );
        assert_eq!(
            classify_health(Duration::from_secs(1), 0.95, &config),
            WorkerHealth::Degraded
        );
        assert_eq!(
            classify_health(Duration::from_secs(1), 0.89, &config),
            WorkerHealth::Healthy
        );
    }

    #[test]
    fn test_fresh_low_load_worker_is_healthy() {
        let config = HealthConfig::default();
        assert_eq!(
            classify_health(Duration::from_secs(5), 0.5, &config),
            WorkerHealth::Healthy
        );
    }

    #[test]
    fn test_significant_load_change_threshold() {
        assert!(is_significant_load_change(0.5, 0.6));
        assert!(is_significant_load_change(0.5, 0.4));
        assert!(!is_significant_load_change(0.5, 0.55));
        assert!(!is_significant_load_change(0.5, 0.5));
    }

    #[test]
    fn test_rolling_avg_blend() {
        let next = rolling_avg_duration(5000.0, 1000.0);
        assert!((next - (0.1 * 1000.0 + 0.9 * 5000.0)).abs() < 1e-9);
    }
}
