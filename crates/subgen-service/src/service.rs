//! The service facade: submit, poll, subscribe, download, cancel.

use std::path::Path;
use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::fs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use subgen_media::{MediaStore, Transcriber};
use subgen_models::{JobError, JobId, JobRecord, JobState, JobStatusView, LanguageCode};
use subgen_queue::{JobQueue, JobStore, ProgressChannel};
use subgen_worker::{ProcessorContext, WorkerPool};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::retention::RetentionManager;

/// Asynchronous subtitle transcription service.
///
/// Owns the full pipeline: upload ingress, the job store and queue, a
/// worker pool running the transcriber, and the retention sweeper.
/// Submissions return immediately with a job id; results arrive via
/// polling, push subscription, and artifact download.
pub struct SubtitleService {
    config: ServiceConfig,
    media: MediaStore,
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    progress: Arc<ProgressChannel>,
    pool: WorkerPool,
    retention: Arc<RetentionManager>,
    shutdown: watch::Sender<bool>,
}

impl SubtitleService {
    /// Open the service over a data directory.
    ///
    /// Persisted jobs are reloaded; jobs that were Queued or Running
    /// when the previous process stopped are re-enqueued so no accepted
    /// work is lost across restarts.
    pub async fn new(
        config: ServiceConfig,
        transcriber: Arc<dyn Transcriber>,
    ) -> ServiceResult<Self> {
        for dir in [config.media_dir(), config.artifacts_dir(), config.state_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| ServiceError::Storage(format!("create {}: {}", dir.display(), e)))?;
        }

        let progress = Arc::new(ProgressChannel::new());
        let store = Arc::new(JobStore::open(config.state_dir(), progress.clone()).await?);
        let queue = Arc::new(JobQueue::new());
        let media = MediaStore::new(config.media_dir());

        let service = Self {
            pool: WorkerPool::new(ProcessorContext {
                store: store.clone(),
                queue: queue.clone(),
                transcriber,
                artifacts_dir: config.artifacts_dir(),
                config: config.worker.clone(),
            }),
            retention: Arc::new(RetentionManager::new(
                store.clone(),
                MediaStore::new(config.media_dir()),
                config.grace_period,
            )),
            shutdown: watch::channel(false).0,
            config,
            media,
            store,
            queue,
            progress,
        };
        service.recover().await?;
        Ok(service)
    }

    /// Re-enqueue jobs interrupted by a previous shutdown.
    async fn recover(&self) -> ServiceResult<()> {
        let mut recovered = 0;
        for job in self.store.all_jobs().await {
            match job.state {
                JobState::Queued => {
                    self.queue.enqueue(job.id.clone());
                    recovered += 1;
                }
                JobState::Running => {
                    // The worker that held it is gone; reset and requeue
                    self.store.requeue(&job.id).await?;
                    self.queue.enqueue(job.id.clone());
                    recovered += 1;
                }
                _ => {}
            }
        }
        if recovered > 0 {
            info!(count = recovered, "recovered interrupted jobs");
        }
        Ok(())
    }

    /// Start the worker pool and retention sweeper.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.pool.start();
        handles.push(
            self.retention
                .clone()
                .spawn(self.config.sweep_interval, self.shutdown.subscribe()),
        );
        handles
    }

    /// Accept an upload and enqueue a transcription job.
    ///
    /// Validates and stores the payload before the job becomes visible;
    /// a rejected upload creates no job. Returns the initial status
    /// snapshot (state Queued).
    pub async fn submit(&self, bytes: &[u8], filename: &str) -> ServiceResult<JobStatusView> {
        let mut job = JobRecord::new(filename, "", self.config.languages.clone());
        let source = self.media.store_upload(bytes, filename, &job.id).await?;
        job.source_path = source.clone();

        let view = match self.store.insert(job).await {
            Ok(view) => view,
            Err(e) => {
                // Don't leave a stored file with no owning record
                let _ = subgen_media::remove_if_exists(&source).await;
                return Err(e.into());
            }
        };

        self.queue.enqueue(view.job_id.clone());
        info!(job_id = %view.job_id, filename = filename, "accepted transcription job");
        Ok(view)
    }

    /// Current status snapshot for a job.
    pub async fn poll(&self, id: &JobId) -> ServiceResult<JobStatusView> {
        self.store
            .view(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("job {}", id)))
    }

    /// Subscribe to a job's status updates.
    ///
    /// The stream starts with the current snapshot, then yields every
    /// subsequent transition, and ends after the terminal one. For an
    /// already-terminal job the stream carries just the snapshot.
    pub async fn subscribe(
        &self,
        id: &JobId,
    ) -> ServiceResult<impl Stream<Item = JobStatusView> + Send + Unpin> {
        // Register before reading the snapshot so no transition between
        // the two can be missed; duplicates are fine, gaps are not.
        let receiver = self.progress.subscribe(id);
        let Some(snapshot) = self.store.view(id).await else {
            // The subscribe call created a channel for a job that does
            // not exist; take it back out.
            drop(receiver);
            self.progress.drop_channel(id);
            return Err(ServiceError::not_found(format!("job {}", id)));
        };

        if snapshot.is_terminal() {
            // The subscribe call above may have re-created a channel for
            // a settled job; close it again.
            self.progress.drop_channel(id);
            drop(receiver);
            return Ok(stream::once(async move { snapshot }).boxed());
        }

        let updates = BroadcastStream::new(receiver).filter_map(|item| async move {
            // Lagged receivers skip to newer snapshots; views are
            // cumulative so nothing is lost.
            item.ok()
        });
        Ok(stream::once(async move { snapshot }).chain(updates).boxed())
    }

    /// Read a finished subtitle artifact.
    ///
    /// Returns the SRT bytes and a download filename derived from the
    /// original upload, `{stem}_{lang}.srt`.
    pub async fn fetch_artifact(
        &self,
        id: &JobId,
        language: &LanguageCode,
    ) -> ServiceResult<(Vec<u8>, String)> {
        let job = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("job {}", id)))?;

        if job.state != JobState::Succeeded {
            return Err(ServiceError::not_found(format!(
                "job {} has no artifacts (state {})",
                id, job.state
            )));
        }
        let path = job.artifacts.get(language).ok_or_else(|| {
            ServiceError::not_found(format!("no {} subtitles for job {}", language, id))
        })?;

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::not_found(format!(
                    "artifact for job {} already removed",
                    id
                )));
            }
            Err(e) => return Err(ServiceError::Storage(e.to_string())),
        };

        let stem = Path::new(&job.original_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(id.as_str());
        Ok((bytes, format!("{}_{}.srt", stem, language)))
    }

    /// Cancel a job if it has not started running.
    ///
    /// A queued job is failed with a Cancelled error; a running or
    /// terminal job is left alone. Either way the current snapshot is
    /// returned so the caller sees the outcome.
    pub async fn cancel(&self, id: &JobId) -> ServiceResult<JobStatusView> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("job {}", id)))?;

        if self.queue.remove(id) {
            if !self.store.set_failed(id, JobError::cancelled()).await? {
                // Lost the race to a terminal transition
                warn!(job_id = %id, "cancel raced with completion");
            }
        }
        self.poll(id).await
    }

    /// Stop background tasks. In-flight jobs finish their current step
    /// and are recovered on the next start.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        let _ = self.shutdown.send(true);
    }

    /// Languages this service produces subtitles for.
    pub fn languages(&self) -> &[LanguageCode] {
        &self.config.languages
    }
}
