use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// Heuristic predictor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// EMA blend factor for duration learning.
    pub alpha: f64,
    /// Returned for task types with no samples yet.
    pub default_duration_ms: u64,
    /// Sample count at which confidence reaches 1.0.
    pub confidence_threshold: u64,
    /// Feedback updates between automatic snapshots.
    pub snapshot_interval: u64,
    /// Single key the whole predictor state is persisted under.
    pub persistence_key: String,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            default_duration_ms: 5_000,
            confidence_threshold: 100,
            snapshot_interval: 100,
            persistence_key: "scheduler:predictions".to_string(),
        }
    }
}

impl ConfigValidator for PredictionConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_fraction(self.alpha, "prediction.alpha")?;
        ValidationUtils::validate_positive_ms(
            self.default_duration_ms,
            "prediction.default_duration_ms",
        )?;
        if self.confidence_threshold == 0 {
            return Err(crate::ConfigError::Validation(
                "prediction.confidence_threshold must be at least 1".to_string(),
            ));
        }
        if self.snapshot_interval == 0 {
            return Err(crate::ConfigError::Validation(
                "prediction.snapshot_interval must be at least 1".to_string(),
            ));
        }
        ValidationUtils::validate_not_empty(&self.persistence_key, "prediction.persistence_key")?;
        Ok(())
    }
}

/// Feedback pipeline tuning: drift band and accuracy tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Rolling accuracy window size; oldest samples are evicted.
    pub accuracy_window_size: usize,
    /// Relative error bound for a sample to count as accurate.
    pub accuracy_threshold: f64,
    /// actual/predicted below this ratio is drift.
    pub drift_lower: f64,
    /// actual/predicted above this ratio is drift.
    pub drift_upper: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            accuracy_window_size: 1_000,
            accuracy_threshold: 0.25,
            drift_lower: 0.5,
            drift_upper: 2.0,
        }
    }
}

impl ConfigValidator for FeedbackConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(
            self.accuracy_window_size,
            "feedback.accuracy_window_size",
            1_000_000,
        )?;
        if self.accuracy_threshold <= 0.0 {
            return Err(crate::ConfigError::Validation(
                "feedback.accuracy_threshold must be positive".to_string(),
            ));
        }
        if self.drift_lower <= 0.0 || self.drift_upper <= self.drift_lower {
            return Err(crate::ConfigError::Validation(
                "feedback drift band must satisfy 0 < drift_lower < drift_upper".to_string(),
            ));
        }
        Ok(())
    }
}
