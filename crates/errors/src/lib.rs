use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("message queue error: {0}")]
    MessageQueue(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("prediction error: {0}")]
    Prediction(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("worker not found: {id}")]
    WorkerNotFound { id: String },
    #[error("No workers available")]
    NoWorkersAvailable,
    #[error("invalid task: {0}")]
    InvalidTask(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn message_queue<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }
    pub fn prediction<S: Into<String>>(msg: S) -> Self {
        Self::Prediction(msg.into())
    }
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn invalid_task<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTask(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether retrying the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::MessageQueue(_)
                | SchedulerError::Persistence(_)
                | SchedulerError::Timeout(_)
                | SchedulerError::NoWorkersAvailable
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_workers_message_is_stable() {
        // The dispatch result surfaces this string verbatim to callers.
        assert_eq!(
            SchedulerError::NoWorkersAvailable.to_string(),
            "No workers available"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SchedulerError::message_queue("down").is_retryable());
        assert!(SchedulerError::persistence("down").is_retryable());
        assert!(SchedulerError::NoWorkersAvailable.is_retryable());
        assert!(!SchedulerError::invalid_task("bad payload").is_retryable());
        assert!(!SchedulerError::config_error("weights").is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SchedulerError::config_error("bad").is_fatal());
        assert!(SchedulerError::Internal("bug".to_string()).is_fatal());
        assert!(!SchedulerError::prediction("cold").is_fatal());
    }

    #[test]
    fn test_serde_json_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SchedulerError = parse_err.into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
