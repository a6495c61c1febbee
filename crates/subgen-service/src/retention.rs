//! Retention: reap terminal jobs after a grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use subgen_media::{remove_if_exists, MediaStore};
use subgen_models::JobRecord;
use subgen_queue::JobStore;

/// Deletes expired job state and files.
///
/// A job becomes reapable once it has been terminal for the grace
/// period. Files go first, the record last, so a crash mid-reap leaves
/// the job visible and it is retried on the next sweep.
pub struct RetentionManager {
    store: Arc<JobStore>,
    media: MediaStore,
    grace: chrono::Duration,
}

impl RetentionManager {
    pub fn new(store: Arc<JobStore>, media: MediaStore, grace: Duration) -> Self {
        Self {
            store,
            media,
            grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// One sweep over persisted jobs. Returns how many were reaped.
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let mut reaped = 0;

        for job in self.store.terminal_jobs().await {
            if !job.reapable(now, self.grace) {
                continue;
            }
            match self.reap(&job).await {
                Ok(()) => {
                    info!(job_id = %job.id, "reaped expired job");
                    reaped += 1;
                }
                Err(e) => {
                    // Record stays; the next sweep retries the deletion
                    warn!(job_id = %job.id, "failed to reap job, will retry: {}", e);
                }
            }
        }
        reaped
    }

    async fn reap(&self, job: &JobRecord) -> anyhow::Result<()> {
        for path in job.artifacts.values() {
            remove_if_exists(path).await?;
        }
        remove_if_exists(&job.source_path).await?;

        // Best effort; the directory may hold nothing but may also be gone
        let _ = tokio::fs::remove_dir(self.media.job_dir(&job.id)).await;

        self.store.remove(&job.id).await?;
        Ok(())
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("retention sweeper shutting down");
                            return;
                        }
                    }
                }
            }
        })
    }
}
