//! Service error types.

use thiserror::Error;

use subgen_media::MediaError;
use subgen_queue::QueueError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced at the service boundary.
///
/// Worker-side failures never appear here directly; they are recorded
/// on the job and reach the caller as an error kind and message inside
/// the status view.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<MediaError> for ServiceError {
    fn from(e: MediaError) -> Self {
        if e.is_invalid_input() {
            Self::InvalidInput(e.to_string())
        } else {
            Self::Storage(e.to_string())
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::JobNotFound(id) => Self::NotFound(id),
            other => Self::Storage(other.to_string()),
        }
    }
}
