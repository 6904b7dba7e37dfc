use thiserror::Error;

/// Errors surfaced at the CLI boundary. `CoordinatorUnreachable` deliberately
/// collapses every possible coordinator failure into one operator-facing
/// message — the operator needs "is Redis up?", not a stack trace.
#[derive(Error, Debug)]
pub enum CtlError {
    #[error("Unable to connect to Redis at {0}\nPlease ensure Redis is running and accessible.")]
    CoordinatorUnreachable(String),

    #[error("Error reading file: {0}")]
    FileRead(String),
}

pub type Result<T> = std::result::Result<T, CtlError>;

/// Maps any coordinator-layer failure to the single-line operator message,
/// matching `control_cli.py`'s `_redis_operation` wrapper.
pub fn coordinator_op<T>(
    redis_url: &str,
    result: std::result::Result<T, bazbeans_common::CoordinatorError>,
) -> Result<T> {
    result.map_err(|_| CtlError::CoordinatorUnreachable(redis_url.to_string()))
}
