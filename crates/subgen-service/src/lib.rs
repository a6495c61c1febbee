//! Subtitle transcription service.
//!
//! Ties the pipeline together behind one facade: upload ingress, job
//! queue and store, worker pool, retention sweeper, and the status
//! notifier (poll + push subscriptions).

pub mod config;
pub mod error;
pub mod retention;
pub mod service;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use retention::RetentionManager;
pub use service::SubtitleService;
