//! File-backed job status store.
//!
//! Each record is persisted as one JSON file under the state directory,
//! written atomically (temp file + rename). Records are reloaded on
//! open, so completion timestamps survive a restart and the retention
//! manager can still reap terminal jobs afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use subgen_models::{JobError, JobId, JobRecord, JobStatusView, LanguageCode};

use crate::error::{QueueError, QueueResult};
use crate::progress::ProgressChannel;

/// Durable job status store.
///
/// All transitions go through this type, which serializes them per
/// store and publishes the resulting snapshot to the progress channel
/// before releasing the write lock. Readers therefore never observe a
/// rollback or a half-applied terminal state.
pub struct JobStore {
    dir: PathBuf,
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    progress: Arc<ProgressChannel>,
}

impl JobStore {
    /// Open the store, loading any records persisted by a previous run.
    pub async fn open(state_dir: impl AsRef<Path>, progress: Arc<ProgressChannel>) -> QueueResult<Self> {
        let dir = state_dir.as_ref().join("jobs");
        fs::create_dir_all(&dir).await?;

        let mut jobs = HashMap::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<JobRecord>(&bytes) {
                    Ok(job) => {
                        jobs.insert(job.id.clone(), job);
                    }
                    Err(e) => warn!(path = %path.display(), "skipping unreadable job record: {}", e),
                },
                Err(e) => warn!(path = %path.display(), "failed to read job record: {}", e),
            }
        }

        if !jobs.is_empty() {
            info!("loaded {} persisted job records", jobs.len());
        }

        Ok(Self {
            dir,
            jobs: RwLock::new(jobs),
            progress,
        })
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Atomic persist: write to a temp file, then rename over the target.
    async fn persist(&self, job: &JobRecord) -> QueueResult<()> {
        let path = self.record_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)?;
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Insert a new record and publish its initial snapshot.
    pub async fn insert(&self, job: JobRecord) -> QueueResult<JobStatusView> {
        let mut jobs = self.jobs.write().await;
        self.persist(&job).await?;
        let view = JobStatusView::from(&job);
        jobs.insert(job.id.clone(), job);
        self.progress.publish(&view);
        Ok(view)
    }

    /// Fetch a full record.
    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Fetch the external projection of a record.
    pub async fn view(&self, id: &JobId) -> Option<JobStatusView> {
        self.jobs.read().await.get(id).map(JobStatusView::from)
    }

    /// All records, in no particular order.
    pub async fn all_jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Records currently in a terminal state.
    pub async fn terminal_jobs(&self) -> Vec<JobRecord> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_terminal())
            .cloned()
            .collect()
    }

    /// Apply a mutation, persisting and publishing only if it changed
    /// the record. Returns whether the mutation applied.
    ///
    /// The op runs on a copy and is committed to the map only after the
    /// persist succeeds, so a disk failure never leaves readers seeing
    /// a state that would vanish on restart.
    async fn mutate<F>(&self, id: &JobId, op: F) -> QueueResult<bool>
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        let mut updated = jobs
            .get(id)
            .ok_or_else(|| QueueError::job_not_found(id))?
            .clone();

        if !op(&mut updated) {
            return Ok(false);
        }
        self.persist(&updated).await?;
        let view = JobStatusView::from(&updated);
        jobs.insert(id.clone(), updated);
        // Published under the write lock so observers see transitions
        // in commit order.
        self.progress.publish(&view);
        Ok(true)
    }

    /// Queued -> Running. Returns false if the job is not claimable
    /// (e.g. it was cancelled between enqueue and claim).
    pub async fn set_running(&self, id: &JobId) -> QueueResult<bool> {
        self.mutate(id, |job| job.set_running()).await
    }

    /// Progress update. A no-op for terminal jobs, so a stale update
    /// from a retried worker can never overwrite a result.
    pub async fn set_progress(
        &self,
        id: &JobId,
        progress: u8,
        phase: Option<String>,
    ) -> QueueResult<bool> {
        self.mutate(id, |job| job.set_progress(progress, phase)).await
    }

    /// Terminal success with the generated artifacts.
    pub async fn set_succeeded(
        &self,
        id: &JobId,
        artifacts: BTreeMap<LanguageCode, PathBuf>,
    ) -> QueueResult<bool> {
        self.mutate(id, |job| job.succeed(artifacts)).await
    }

    /// Terminal failure.
    pub async fn set_failed(&self, id: &JobId, error: JobError) -> QueueResult<bool> {
        self.mutate(id, |job| job.fail(error)).await
    }

    /// Liveness requeue: Running -> Queued.
    pub async fn requeue(&self, id: &JobId) -> QueueResult<bool> {
        self.mutate(id, |job| job.requeue()).await
    }

    /// Evict a record: forget it in memory, delete its persisted file
    /// and drop its progress channel. Missing files are fine.
    pub async fn remove(&self, id: &JobId) -> QueueResult<()> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(id);
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(QueueError::Storage(e)),
        }
        self.progress.drop_channel(id);
        debug!(job_id = %id, "evicted job record");
        Ok(())
    }
}
