//! Transcription worker pool.
//!
//! This crate provides:
//! - Fixed-slot job consumption from the queue
//! - Per-job transcription with bounded retries and progress phases
//! - A supervisor that recovers jobs from crashed workers

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerPool;
pub use processor::ProcessorContext;
