use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// Dispatch loop and circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Consecutive predictor failures before the breaker opens.
    pub fallback_threshold: u32,
    /// While open, one predictor probe is allowed per interval.
    pub probe_interval_ms: u64,
    /// Non-predictive strategy: `round_robin` or `lowest_load`.
    pub fallback_strategy: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: 3,
            probe_interval_ms: 30_000,
            fallback_strategy: "round_robin".to_string(),
        }
    }
}

const VALID_FALLBACK_STRATEGIES: [&str; 2] = ["round_robin", "lowest_load"];

impl ConfigValidator for DispatchConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.fallback_threshold < 1 {
            return Err(crate::ConfigError::Validation(
                "dispatch.fallback_threshold must be at least 1".to_string(),
            ));
        }
        ValidationUtils::validate_positive_ms(self.probe_interval_ms, "dispatch.probe_interval_ms")?;
        if !VALID_FALLBACK_STRATEGIES.contains(&self.fallback_strategy.as_str()) {
            return Err(crate::ConfigError::Validation(format!(
                "invalid dispatch.fallback_strategy: {}. Valid options: {:?}",
                self.fallback_strategy, VALID_FALLBACK_STRATEGIES
            )));
        }
        Ok(())
    }
}

/// Relative weight of each scoring objective. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub wait: f64,
    pub load: f64,
    pub priority: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            wait: 0.4,
            load: 0.4,
            priority: 0.2,
        }
    }
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

impl ConfigValidator for ScoringWeights {
    fn validate(&self) -> crate::ConfigResult<()> {
        for (value, name) in [
            (self.wait, "scoring.weights.wait"),
            (self.load, "scoring.weights.load"),
            (self.priority, "scoring.weights.priority"),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::ConfigError::Validation(format!(
                    "{name} must be in [0, 1]"
                )));
            }
        }
        let sum = self.wait + self.load + self.priority;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(crate::ConfigError::Validation(format!(
                "scoring weights must sum to 1 (got {sum})"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Estimated waits beyond this are all equally bad.
    pub max_wait_ms: u64,
    pub max_priority: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            max_wait_ms: 60_000,
            max_priority: 10,
        }
    }
}

impl ConfigValidator for ScoringConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.weights.validate()?;
        ValidationUtils::validate_positive_ms(self.max_wait_ms, "scoring.max_wait_ms")?;
        if self.max_priority < 1 {
            return Err(crate::ConfigError::Validation(
                "scoring.max_priority must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
