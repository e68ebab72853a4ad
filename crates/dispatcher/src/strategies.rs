use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use foresight_domain::models::{Task, WorkerState};

/// Deterministic non-predictive worker selection.
///
/// Strategies are synchronous and I/O-free; they only look at the candidate
/// snapshot handed to them. The eligible list is recomputed on every call
/// under the task's capability filter.
pub trait FallbackStrategy: Send + Sync {
    fn select(&self, task: &Task, candidates: &[WorkerState]) -> Option<String>;
    fn name(&self) -> &str;
}

fn eligible<'a>(task: &Task, candidates: &'a [WorkerState]) -> Vec<&'a WorkerState> {
    candidates
        .iter()
        .filter(|w| {
            w.is_schedulable() && w.has_capacity() && w.has_capabilities(&task.required_capabilities)
        })
        .collect()
}

/// Rotating cursor over the eligible list.
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackStrategy for RoundRobinStrategy {
    fn select(&self, task: &Task, candidates: &[WorkerState]) -> Option<String> {
        let suitable = eligible(task, candidates);
        if suitable.is_empty() {
            debug!(task_id = %task.id, "no eligible workers for round-robin fallback");
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % suitable.len();
        let selected = suitable[index];
        debug!(
            task_id = %task.id,
            worker_id = %selected.id,
            index,
            pool = suitable.len(),
            "round-robin fallback selection"
        );
        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

/// Picks the worker with the lowest load, then the lowest concurrency
/// saturation, then the smallest id.
pub struct LowestLoadStrategy;

impl LowestLoadStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LowestLoadStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackStrategy for LowestLoadStrategy {
    fn select(&self, task: &Task, candidates: &[WorkerState]) -> Option<String> {
        let mut suitable = eligible(task, candidates);
        if suitable.is_empty() {
            debug!(task_id = %task.id, "no eligible workers for lowest-load fallback");
            return None;
        }

        suitable.sort_by(|a, b| {
            a.current_load
                .partial_cmp(&b.current_load)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.saturation()
                        .partial_cmp(&b.saturation())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let selected = suitable[0];
        debug!(
            task_id = %task.id,
            worker_id = %selected.id,
            load = selected.current_load,
            "lowest-load fallback selection"
        );
        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "LowestLoad"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foresight_domain::models::WorkerStatus;
    use foresight_testing_utils::builders::{TaskBuilder, WorkerBuilder};
    use std::collections::HashMap;

    fn pool(ids: &[&str]) -> Vec<WorkerState> {
        ids.iter().map(|id| WorkerBuilder::new(id).build()).collect()
    }

    #[test]
    fn test_round_robin_distributes_evenly() {
        let strategy = RoundRobinStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        let workers = pool(&["w1", "w2", "w3"]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        let calls = 10;
        for _ in 0..calls {
            let id = strategy.select(&task, &workers).unwrap();
            *counts.entry(id).or_default() += 1;
        }

        // 10 calls over 3 workers: each gets ceil or floor of 10/3.
        for id in ["w1", "w2", "w3"] {
            let n = counts[id];
            assert!(n == 3 || n == 4, "{id} got {n} dispatches");
        }
        assert_eq!(counts.values().sum::<usize>(), calls);
    }

    #[test]
    fn test_round_robin_empty_pool() {
        let strategy = RoundRobinStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        assert!(strategy.select(&task, &[]).is_none());
    }

    #[test]
    fn test_round_robin_respects_capability_filter() {
        let strategy = RoundRobinStrategy::new();
        let task = TaskBuilder::new("t", "etl").capability("gpu").build();
        let workers = vec![
            WorkerBuilder::new("w1").build(),
            WorkerBuilder::new("w2").capability("gpu").build(),
        ];
        for _ in 0..4 {
            assert_eq!(strategy.select(&task, &workers).unwrap(), "w2");
        }
    }

    #[test]
    fn test_round_robin_skips_unschedulable_and_full() {
        let strategy = RoundRobinStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        let workers = vec![
            WorkerBuilder::new("w1").status(WorkerStatus::Offline).build(),
            WorkerBuilder::new("w2")
                .max_concurrency(1)
                .active_tasks(1)
                .build(),
            WorkerBuilder::new("w3").build(),
        ];
        for _ in 0..3 {
            assert_eq!(strategy.select(&task, &workers).unwrap(), "w3");
        }
    }

    #[test]
    fn test_lowest_load_ordering() {
        let strategy = LowestLoadStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        let workers = vec![
            WorkerBuilder::new("w1").load(0.6).build(),
            WorkerBuilder::new("w2").load(0.2).build(),
            WorkerBuilder::new("w3").load(0.4).build(),
        ];
        assert_eq!(strategy.select(&task, &workers).unwrap(), "w2");
    }

    #[test]
    fn test_lowest_load_breaks_ties_on_saturation_then_id() {
        let strategy = LowestLoadStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        let workers = vec![
            WorkerBuilder::new("w1")
                .load(0.5)
                .max_concurrency(4)
                .active_tasks(3)
                .build(),
            WorkerBuilder::new("w2")
                .load(0.5)
                .max_concurrency(4)
                .active_tasks(1)
                .build(),
        ];
        assert_eq!(strategy.select(&task, &workers).unwrap(), "w2");

        let equal = vec![
            WorkerBuilder::new("w2").load(0.5).build(),
            WorkerBuilder::new("w1").load(0.5).build(),
        ];
        assert_eq!(strategy.select(&task, &equal).unwrap(), "w1");
    }

    #[test]
    fn test_lowest_load_empty_pool() {
        let strategy = LowestLoadStrategy::new();
        let task = TaskBuilder::new("t", "etl").build();
        assert!(strategy.select(&task, &[]).is_none());
    }
}
