//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur at the media boundary.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("Source file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Source file contains no audio: {0}")]
    EmptyAudio(PathBuf),

    #[error("No target languages requested")]
    NoTargetLanguages,

    #[error("Transcription model failed: {message}")]
    Model { message: String, transient: bool },

    #[error("Malformed segments: {0}")]
    MalformedSegments(String),

    #[error("whisper CLI not found in PATH")]
    WhisperNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a model failure.
    pub fn model(message: impl Into<String>, transient: bool) -> Self {
        Self::Model {
            message: message.into(),
            transient,
        }
    }

    /// Create a segment contract violation.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedSegments(message.into())
    }

    /// User-correctable input problems, rejected before a job exists.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            MediaError::EmptyUpload
                | MediaError::InvalidFilename(_)
                | MediaError::UnsupportedExtension(_)
                | MediaError::NoTargetLanguages
        )
    }

    /// Whether retrying the model invocation could plausibly help.
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::Model { transient: true, .. })
    }
}
