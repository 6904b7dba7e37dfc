use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("coordinator error: {0}")]
    Coordinator(#[from] bazbeans_common::CoordinatorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("upstream validation command failed")]
    ValidationFailed,

    #[error("reload command failed")]
    ReloadFailed,
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
