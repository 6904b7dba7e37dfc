use thiserror::Error;

/// Failures surfaced by the coordinator client and everything built on top
/// of it (registry, command bus, event bus, resolvers).
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("coordinator connection error: {0}")]
    Connection(String),

    #[error("coordinator protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("operation timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

impl From<redis::RedisError> for CoordinatorError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CoordinatorError::Timeout(err.to_string())
        } else if err.is_connection_dropped() || err.is_connection_refusal() {
            CoordinatorError::Connection(err.to_string())
        } else {
            CoordinatorError::Protocol(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let err = CoordinatorError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "coordinator connection error: refused");
    }

    #[test]
    fn serialization_error_from_serde() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: CoordinatorError = bad.unwrap_err().into();
        assert!(matches!(err, CoordinatorError::Serialization(_)));
    }
}
