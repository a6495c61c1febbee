//! Shared data models for the subgen transcription pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle state
//! - Transcript segments produced by the speech model
//! - Language codes for subtitle targets
//! - Externally visible job status projections

pub mod job;
pub mod language;
pub mod segment;
pub mod status;

// Re-export common types
pub use job::{ErrorKind, JobError, JobId, JobRecord, JobState};
pub use language::LanguageCode;
pub use segment::TranscriptSegment;
pub use status::JobStatusView;
