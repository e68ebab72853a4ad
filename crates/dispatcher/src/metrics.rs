use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ::metrics::{counter, histogram};

/// Process-local dispatch counters, mirrored into the `metrics` facade for
/// whatever exporter the embedding process installs.
#[derive(Debug, Clone, Default)]
pub struct DispatcherMetrics {
    pub tasks_processed: Arc<AtomicU64>,
    pub dispatched_predicted: Arc<AtomicU64>,
    pub dispatched_fallback: Arc<AtomicU64>,
    pub publish_failures: Arc<AtomicU64>,
    pub no_workers: Arc<AtomicU64>,
    pub malformed_tasks: Arc<AtomicU64>,
    pub predictor_errors: Arc<AtomicU64>,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_processed(&self) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_tasks_processed_total").increment(1);
    }

    pub fn record_predicted_dispatch(&self) {
        self.dispatched_predicted.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_dispatches_total", "path" => "prediction").increment(1);
    }

    pub fn record_fallback_dispatch(&self) {
        self.dispatched_fallback.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_dispatches_total", "path" => "fallback").increment(1);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_publish_failures_total").increment(1);
    }

    pub fn record_no_workers(&self) {
        self.no_workers.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_no_workers_total").increment(1);
    }

    pub fn record_malformed_task(&self) {
        self.malformed_tasks.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_malformed_tasks_total").increment(1);
    }

    pub fn record_predictor_error(&self) {
        self.predictor_errors.fetch_add(1, Ordering::Relaxed);
        counter!("scheduler_predictor_errors_total").increment(1);
    }

    pub fn record_dispatch_duration(&self, duration_ms: f64) {
        histogram!("scheduler_dispatch_duration_ms").record(duration_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            dispatched_predicted: self.dispatched_predicted.load(Ordering::Relaxed),
            dispatched_fallback: self.dispatched_fallback.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            no_workers: self.no_workers.load(Ordering::Relaxed),
            malformed_tasks: self.malformed_tasks.load(Ordering::Relaxed),
            predictor_errors: self.predictor_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_processed: u64,
    pub dispatched_predicted: u64,
    pub dispatched_fallback: u64,
    pub publish_failures: u64,
    pub no_workers: u64,
    pub malformed_tasks: u64,
    pub predictor_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = DispatcherMetrics::new();
        metrics.record_task_processed();
        metrics.record_task_processed();
        metrics.record_predicted_dispatch();
        metrics.record_fallback_dispatch();
        metrics.record_publish_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_processed, 2);
        assert_eq!(snapshot.dispatched_predicted, 1);
        assert_eq!(snapshot.dispatched_fallback, 1);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.no_workers, 0);
    }

    #[test]
    fn test_clone_shares_counters() {
        let metrics = DispatcherMetrics::new();
        let clone = metrics.clone();
        clone.record_malformed_task();
        assert_eq!(metrics.snapshot().malformed_tasks, 1);
    }
}
