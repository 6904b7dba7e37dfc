use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("coordinator error: {0}")]
    Coordinator(#[from] bazbeans_common::CoordinatorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
