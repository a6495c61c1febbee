//! Job queue, status store and progress channel.
//!
//! This crate provides:
//! - FIFO job hand-off with leases and a visibility timeout
//! - A file-backed status store with atomic, monotone transitions
//! - Progress events via per-job broadcast channels
//!
//! The queue is in-process by design: status durability comes from the
//! store's persisted records, and crashed workers are recovered by
//! reclaiming idle leases.

pub mod error;
pub mod progress;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use progress::ProgressChannel;
pub use queue::{JobQueue, Lease};
pub use store::JobStore;
