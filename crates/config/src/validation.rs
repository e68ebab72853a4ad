use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a millisecond duration is non-zero
    pub fn validate_positive_ms(value_ms: u64, field_name: &str) -> ConfigResult<()> {
        if value_ms == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Validate that a count is within a sane bound
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a fraction lies in (0, 1]
    pub fn validate_fraction(value: f64, field_name: &str) -> ConfigResult<()> {
        if !(value > 0.0 && value <= 1.0) {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be in (0, 1]"
            )));
        }
        Ok(())
    }

    /// Validate that a URL has a valid format
    pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
        if url.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        if !url.contains("://") {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be a valid URL with protocol"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("test", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_positive_ms() {
        assert!(ValidationUtils::validate_positive_ms(1000, "field").is_ok());
        assert!(ValidationUtils::validate_positive_ms(0, "field").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(10, "field", 100).is_ok());
        assert!(ValidationUtils::validate_count(0, "field", 100).is_err());
        assert!(ValidationUtils::validate_count(101, "field", 100).is_err());
    }

    #[test]
    fn test_validate_fraction() {
        assert!(ValidationUtils::validate_fraction(0.3, "alpha").is_ok());
        assert!(ValidationUtils::validate_fraction(1.0, "alpha").is_ok());
        assert!(ValidationUtils::validate_fraction(0.0, "alpha").is_err());
        assert!(ValidationUtils::validate_fraction(1.1, "alpha").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(ValidationUtils::validate_url("redis://localhost:6379", "url").is_ok());
        assert!(ValidationUtils::validate_url("localhost", "url").is_err());
        assert!(ValidationUtils::validate_url("", "url").is_err());
    }
}
