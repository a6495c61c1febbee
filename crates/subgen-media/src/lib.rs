//! Media ingress, subtitle encoding and the transcription model boundary.
//!
//! This crate provides:
//! - Upload validation and scoped temporary storage
//! - The pure SRT subtitle encoder
//! - The `Transcriber` trait (speech model boundary) and a Whisper CLI
//!   implementation

pub mod error;
pub mod ingress;
pub mod srt;
pub mod transcribe;
pub mod whisper;

pub use error::{MediaError, MediaResult};
pub use ingress::{remove_if_exists, MediaStore};
pub use srt::encode_srt;
pub use transcribe::Transcriber;
pub use whisper::WhisperCliTranscriber;
