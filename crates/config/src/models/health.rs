use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// Worker health thresholds, all measured against heartbeat age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Staleness bound for the registry's eligible-worker filter.
    pub heartbeat_timeout_ms: u64,
    /// Age at which a worker is classified unhealthy and forced offline.
    pub unhealthy_timeout_ms: u64,
    /// Age at which a worker is deleted outright.
    pub removed_timeout_ms: u64,
    /// Reaper tick interval.
    pub health_check_interval_ms: u64,
    /// Seed value for the per-worker rolling average task duration.
    pub avg_task_duration_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 30_000,
            unhealthy_timeout_ms: 30_000,
            removed_timeout_ms: 300_000,
            health_check_interval_ms: 5_000,
            avg_task_duration_ms: 5_000,
        }
    }
}

impl ConfigValidator for HealthConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.heartbeat_timeout_ms < 1000 {
            return Err(crate::ConfigError::Validation(
                "health.heartbeat_timeout_ms must be at least 1000".to_string(),
            ));
        }
        ValidationUtils::validate_positive_ms(
            self.unhealthy_timeout_ms,
            "health.unhealthy_timeout_ms",
        )?;
        ValidationUtils::validate_positive_ms(self.removed_timeout_ms, "health.removed_timeout_ms")?;
        ValidationUtils::validate_positive_ms(
            self.health_check_interval_ms,
            "health.health_check_interval_ms",
        )?;
        ValidationUtils::validate_positive_ms(
            self.avg_task_duration_ms,
            "health.avg_task_duration_ms",
        )?;
        if self.removed_timeout_ms <= self.unhealthy_timeout_ms {
            return Err(crate::ConfigError::Validation(
                "health.removed_timeout_ms must exceed health.unhealthy_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HealthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_heartbeat_timeout_floor() {
        let mut cfg = HealthConfig::default();
        cfg.heartbeat_timeout_ms = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_removed_must_exceed_unhealthy() {
        let mut cfg = HealthConfig::default();
        cfg.removed_timeout_ms = cfg.unhealthy_timeout_ms;
        assert!(cfg.validate().is_err());
    }
}
