use thiserror::Error;

/// Failures of the local state directory
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0} is not managed")]
    ResourceNotFound(String),

    #[error("state: {0}")]
    StateError(String),

    #[error("state lock unavailable: {0}")]
    LockError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("state encoding: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
