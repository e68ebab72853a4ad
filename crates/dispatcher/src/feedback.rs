use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use foresight_config::FeedbackConfig;
use foresight_domain::events::{DriftSeverity, FeedbackEvent};
use foresight_domain::models::CompletionEvent;
use foresight_domain::ports::DurationPredictor;
use foresight_errors::SchedulerResult;

use crate::heartbeat::CapacityTracker;

/// Accuracy is re-checked after this many completion events.
const ACCURACY_CHECK_INTERVAL: u64 = 100;
/// Rolling accuracy below this emits a warning event.
const ACCURACY_WARNING_LEVEL: f64 = 0.8;
/// Drift beyond 3x (either direction) is major.
const MAJOR_DRIFT_RATIO: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct AccuracySample {
    pub task_type: String,
    pub predicted_ms: f64,
    pub actual_ms: f64,
    pub within_threshold: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded rolling window of prediction-vs-actual samples.
pub struct AccuracyTracker {
    window: VecDeque<AccuracySample>,
    capacity: usize,
    threshold: f64,
}

impl AccuracyTracker {
    pub fn new(capacity: usize, threshold: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            threshold,
        }
    }

    /// Record one sample, evicting the oldest on overflow. Returns whether
    /// the prediction landed within the relative error threshold.
    pub fn record(&mut self, task_type: &str, predicted_ms: f64, actual_ms: f64) -> bool {
        let within_threshold =
            predicted_ms > 0.0 && ((actual_ms - predicted_ms).abs() / predicted_ms) <= self.threshold;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(AccuracySample {
            task_type: task_type.to_string(),
            predicted_ms,
            actual_ms,
            within_threshold,
            recorded_at: Utc::now(),
        });
        within_threshold
    }

    /// Fraction of windowed samples within threshold; `None` when empty.
    pub fn accuracy(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let hits = self.window.iter().filter(|s| s.within_threshold).count();
        Some(hits as f64 / self.window.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Closes the loop from completion events back into the predictor, with
/// drift detection and rolling accuracy tracking on the side.
pub struct FeedbackProcessor {
    predictor: Arc<dyn DurationPredictor>,
    capacity: Arc<CapacityTracker>,
    events: mpsc::Sender<FeedbackEvent>,
    config: FeedbackConfig,
    tracker: Mutex<AccuracyTracker>,
    events_seen: AtomicU64,
    stopped: AtomicBool,
}

impl FeedbackProcessor {
    pub fn new(
        predictor: Arc<dyn DurationPredictor>,
        capacity: Arc<CapacityTracker>,
        config: FeedbackConfig,
        events: mpsc::Sender<FeedbackEvent>,
    ) -> Self {
        let tracker = AccuracyTracker::new(config.accuracy_window_size, config.accuracy_threshold);
        Self {
            predictor,
            capacity,
            events,
            config,
            tracker: Mutex::new(tracker),
            events_seen: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Consume completion events until the stream ends or shutdown fires.
    pub fn start(
        self: Arc<Self>,
        mut completions: mpsc::Receiver<CompletionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let processor = self;
        tokio::spawn(async move {
            info!("feedback processor started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    maybe = completions.recv() => match maybe {
                        Some(event) => {
                            if let Err(e) = processor.process_completion(&event).await {
                                warn!(task_id = %event.task_id, "feedback processing failed: {e}");
                            }
                        }
                        None => break,
                    },
                }
            }
            processor.stop();
            info!("feedback processor stopped");
        })
    }

    /// After stop, `process_completion` becomes a no-op.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub async fn process_completion(&self, event: &CompletionEvent) -> SchedulerResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        let actual_ms = event.duration_ms as f64;

        if let Some(predicted_ms) = event.predicted_duration_ms.filter(|p| *p > 0.0) {
            let ratio = actual_ms / predicted_ms;
            if ratio < self.config.drift_lower || ratio > self.config.drift_upper {
                let severity = if ratio > MAJOR_DRIFT_RATIO || ratio < 1.0 / MAJOR_DRIFT_RATIO {
                    DriftSeverity::Major
                } else {
                    DriftSeverity::Minor
                };
                debug!(
                    task_type = %event.task_type,
                    predicted_ms,
                    actual_ms,
                    ratio,
                    ?severity,
                    "prediction drift detected"
                );
                self.emit(FeedbackEvent::DriftDetected {
                    task_type: event.task_type.clone(),
                    predicted_ms,
                    actual_ms,
                    ratio,
                    severity,
                    occurred_at: Utc::now(),
                });
            }

            if let Ok(mut tracker) = self.tracker.lock() {
                tracker.record(&event.task_type, predicted_ms, actual_ms);
            }
        }

        // Keep the per-worker rolling duration average current; it feeds
        // the availability calculator's estimated-free-at.
        self.capacity
            .record_task_duration(&event.worker_id, actual_ms);

        match self
            .predictor
            .feedback(&event.task_type, event.duration_ms)
            .await
        {
            Ok(Some(state)) => {
                self.emit(FeedbackEvent::PredictionUpdated {
                    task_type: state.task_type,
                    ema_duration_ms: state.ema_duration_ms,
                    sample_count: state.sample_count,
                    occurred_at: Utc::now(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(task_type = %event.task_type, "predictor feedback failed: {e}");
            }
        }

        let seen = self.events_seen.fetch_add(1, Ordering::AcqRel) + 1;
        if seen % ACCURACY_CHECK_INTERVAL == 0 {
            self.check_accuracy();
        }
        Ok(())
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.tracker.lock().ok().and_then(|t| t.accuracy())
    }

    fn check_accuracy(&self) {
        let Some(accuracy) = self.accuracy() else {
            return;
        };
        let window_len = self.tracker.lock().map(|t| t.len()).unwrap_or(0);
        if accuracy < ACCURACY_WARNING_LEVEL {
            warn!(accuracy, window_len, "prediction accuracy below threshold");
            self.emit(FeedbackEvent::AccuracyWarning {
                accuracy,
                window_len,
                occurred_at: Utc::now(),
            });
        }
    }

    fn emit(&self, event: FeedbackEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("dropping feedback event, channel full or closed: {e}");
        }
    }
}
