use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Snapshot of the breaker for stats and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub open: bool,
}

/// Failure counter guarding predictor calls.
///
/// `open` holds exactly when `consecutive_failures >= threshold`. There is
/// no half-open state: while open the dispatcher skips the predictor, except
/// that one probe attempt is allowed each `probe_interval` after the last
/// failure; any successful prediction closes the breaker and clears all
/// fields.
#[derive(Debug)]
pub struct PredictorCircuitBreaker {
    threshold: u32,
    probe_interval: Duration,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    open: bool,
}

impl PredictorCircuitBreaker {
    pub fn new(threshold: u32, probe_interval: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            probe_interval,
            consecutive_failures: 0,
            last_failure: None,
            open: false,
        }
    }

    /// Whether the caller should invoke the predictor right now.
    pub fn should_attempt(&self) -> bool {
        if !self.open {
            return true;
        }
        match self.last_failure {
            Some(at) => at.elapsed() >= self.probe_interval,
            None => true,
        }
    }

    /// Record a predictor failure. Returns true when this failure opened
    /// the breaker.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
        if !self.open && self.consecutive_failures >= self.threshold {
            self.open = true;
            warn!(
                failures = self.consecutive_failures,
                "predictor circuit breaker opened"
            );
            return true;
        }
        false
    }

    /// One successful prediction resets everything.
    pub fn record_success(&mut self) {
        if self.open {
            info!("predictor circuit breaker closed");
        }
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn state(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            consecutive_failures: self.consecutive_failures,
            open: self.open,
        }
    }
}
