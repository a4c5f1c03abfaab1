/// Error types shared across the crate.
///
/// Filter translation never fails; only remote fetches, storage and
/// configuration loading surface errors to callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    /// The remote count/list call was rejected
    #[error("data service error: {0}")]
    Service(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A newer request was issued while this one was in flight
    #[error("request {seq} superseded by request {latest}")]
    Superseded { seq: u64, latest: u64 },
}

impl GridError {
    pub fn service(message: impl Into<String>) -> Self {
        GridError::Service(message.into())
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, GridError::Superseded { .. })
    }
}

pub type Result<T> = std::result::Result<T, GridError>;
