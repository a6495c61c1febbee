//! Worker configuration.

use std::time::Duration;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of parallel worker slots, each processing one job at a time
    pub slots: usize,
    /// Extra transcription attempts on transient model failures
    pub max_transcribe_retries: u32,
    /// Base delay for transcription retry backoff (doubles per attempt)
    pub retry_base_delay: Duration,
    /// How often the supervisor scans for stuck leases
    pub claim_interval: Duration,
    /// Maximum lease idle time before a Running job is presumed abandoned
    pub liveness_deadline: Duration,
    /// How often a slot refreshes its lease while the model call runs
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            max_transcribe_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            claim_interval: Duration::from_secs(30),
            liveness_deadline: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            slots: std::env::var("WORKER_SLOTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(2),
            max_transcribe_retries: std::env::var("WORKER_MAX_TRANSCRIBE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            retry_base_delay: Duration::from_millis(
                std::env::var("WORKER_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            liveness_deadline: Duration::from_secs(
                std::env::var("WORKER_LIVENESS_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}
