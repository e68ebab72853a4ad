use std::sync::RwLock;

use tracing::debug;

use foresight_config::{ConfigValidator, ScoringConfig, ScoringWeights};
use foresight_domain::models::{Task, TaskPrediction, WorkerState};

/// One scored eligible worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub worker_id: String,
    pub score: f64,
}

/// Outcome of scoring: the best worker plus the ranked alternatives.
#[derive(Debug, Clone)]
pub struct Selection {
    pub worker_id: String,
    pub score: f64,
    pub reasoning: String,
    pub alternatives: Vec<ScoredCandidate>,
}

/// Normalized sub-score for the predicted queueing wait on a worker.
pub fn wait_score(active_tasks: u32, predicted_duration_ms: f64, max_wait_ms: u64) -> f64 {
    let estimated_wait = active_tasks as f64 * predicted_duration_ms;
    let clamped = estimated_wait.clamp(0.0, max_wait_ms as f64);
    1.0 - clamped / max_wait_ms as f64
}

pub fn load_score(current_load: f64) -> f64 {
    1.0 - current_load.clamp(0.0, 1.0)
}

pub fn priority_score(priority: i32, max_priority: i32) -> f64 {
    priority.clamp(0, max_priority) as f64 / max_priority.max(1) as f64
}

/// Multi-objective per-decision scorer.
///
/// Pure per call: the same task, candidates and prediction always produce
/// the same selection. Ties break on worker id. Weights are swappable at
/// runtime but only through validation.
pub struct DecisionScorer {
    weights: RwLock<ScoringWeights>,
    config: ScoringConfig,
}

impl DecisionScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            weights: RwLock::new(config.weights),
            config,
        }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
            .read()
            .map(|w| *w)
            .unwrap_or_else(|_| self.config.weights)
    }

    /// Replace the weight vector. Invalid weights are rejected and the
    /// previous vector stays in effect.
    pub fn update_weights(&self, weights: ScoringWeights) -> foresight_config::ConfigResult<()> {
        weights.validate()?;
        if let Ok(mut current) = self.weights.write() {
            *current = weights;
        }
        Ok(())
    }

    /// Score every eligible candidate and pick the best. Returns `None`
    /// when no candidate passes the status, capacity and capability filters.
    pub fn select(
        &self,
        task: &Task,
        candidates: &[WorkerState],
        prediction: Option<&TaskPrediction>,
    ) -> Option<Selection> {
        let weights = self.weights();
        // 5 s per queued task is assumed when no prediction is available.
        let predicted_ms = prediction
            .map(|p| p.estimated_duration_ms)
            .unwrap_or(5000.0);

        let mut scored: Vec<(ScoredCandidate, String)> = candidates
            .iter()
            .filter(|w| {
                w.is_schedulable()
                    && w.has_capacity()
                    && w.has_capabilities(&task.required_capabilities)
            })
            .map(|w| {
                let wait = wait_score(w.active_tasks, predicted_ms, self.config.max_wait_ms);
                let load = load_score(w.current_load);
                let priority = priority_score(task.priority, self.config.max_priority);
                let score =
                    weights.wait * wait + weights.load * load + weights.priority * priority;
                let reasoning = format!(
                    "wait={wait:.3} load={load:.3} priority={priority:.3} -> {score:.3}"
                );
                (
                    ScoredCandidate {
                        worker_id: w.id.clone(),
                        score,
                    },
                    reasoning,
                )
            })
            .collect();

        // Highest score first; equal scores resolve by worker id so repeated
        // calls on equal inputs yield the same choice.
        scored.sort_by(|(a, _), (b, _)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.worker_id.cmp(&b.worker_id))
        });

        let (best, reasoning) = scored.first().cloned()?;
        let alternatives = scored.iter().skip(1).map(|(c, _)| c.clone()).collect();

        debug!(task_id = %task.id, worker_id = %best.worker_id, %reasoning, "scored decision");
        Some(Selection {
            worker_id: best.worker_id,
            score: best.score,
            reasoning,
            alternatives,
        })
    }
}
