//! Worker error types.

use thiserror::Error;

use subgen_media::MediaError;
use subgen_models::{ErrorKind, JobError};
use subgen_queue::QueueError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Classify this failure for the job record.
    pub fn to_job_error(&self) -> JobError {
        let kind = match self {
            WorkerError::Media(MediaError::FileNotFound(_))
            | WorkerError::Media(MediaError::EmptyAudio(_))
            | WorkerError::Media(MediaError::UnsupportedExtension(_))
            | WorkerError::Media(MediaError::InvalidFilename(_))
            | WorkerError::Media(MediaError::EmptyUpload)
            | WorkerError::Media(MediaError::NoTargetLanguages) => ErrorKind::InvalidInput,
            WorkerError::Media(MediaError::MalformedSegments(_)) => ErrorKind::MalformedSegments,
            WorkerError::Media(MediaError::Model { .. })
            | WorkerError::Media(MediaError::WhisperNotFound) => ErrorKind::Model,
            WorkerError::Media(MediaError::Io(_))
            | WorkerError::Media(MediaError::JsonParse(_))
            | WorkerError::Queue(_)
            | WorkerError::Io(_) => ErrorKind::Storage,
        };
        JobError::new(kind, self.to_string())
    }
}
