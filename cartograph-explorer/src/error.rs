use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("driver crashed: {0}")]
    Crashed(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl ExploreError {
    /// Driver failures are recorded against the attempted action and handled
    /// by backtracking; anything else propagates.
    pub fn is_action_failure(&self) -> bool {
        matches!(
            self,
            ExploreError::Timeout(_) | ExploreError::ElementNotFound(_) | ExploreError::Crashed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExploreError>;
