//! Per-job processing: transcribe, encode, persist artifacts.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use subgen_media::{encode_srt, MediaError, Transcriber};
use subgen_models::{JobId, JobRecord, LanguageCode};
use subgen_queue::{JobQueue, JobStore, Lease, QueueError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// Everything a worker slot needs to process jobs.
pub struct ProcessorContext {
    pub store: Arc<JobStore>,
    pub queue: Arc<JobQueue>,
    pub transcriber: Arc<dyn Transcriber>,
    pub artifacts_dir: PathBuf,
    pub config: WorkerConfig,
}

impl ProcessorContext {
    fn artifact_path(&self, job_id: &JobId, language: &LanguageCode) -> PathBuf {
        self.artifacts_dir.join(format!("{}_{}.srt", job_id, language))
    }
}

/// Process one claimed job end to end and ack the lease.
///
/// All failures are recorded on the job; nothing escapes to the slot
/// loop except through the job record.
pub async fn process_claimed(ctx: &ProcessorContext, lease: &Lease) {
    let job_id = &lease.job_id;

    match ctx.store.set_running(job_id).await {
        Ok(true) => {}
        Ok(false) => {
            // Cancelled (or otherwise settled) between enqueue and claim
            info!(job_id = %job_id, "claimed job no longer runnable, skipping");
            ctx.queue.ack(lease);
            return;
        }
        Err(QueueError::JobNotFound(_)) => {
            warn!(job_id = %job_id, "claimed job has no record, skipping");
            ctx.queue.ack(lease);
            return;
        }
        Err(e) => {
            error!(job_id = %job_id, "failed to mark job running: {}", e);
            // Leave the lease for the supervisor
            return;
        }
    }

    let Some(job) = ctx.store.get(job_id).await else {
        ctx.queue.ack(lease);
        return;
    };

    match run_pipeline(ctx, &job).await {
        Ok(artifacts) => {
            if let Err(e) = ctx.store.set_succeeded(job_id, artifacts).await {
                error!(job_id = %job_id, "failed to record success: {}", e);
                return;
            }
            info!(job_id = %job_id, "job succeeded");
        }
        Err(e) => {
            let job_error = e.to_job_error();
            warn!(job_id = %job_id, kind = %job_error.kind, "job failed: {}", job_error.message);
            if let Err(e) = ctx.store.set_failed(job_id, job_error).await {
                error!(job_id = %job_id, "failed to record failure: {}", e);
                return;
            }
        }
    }

    ctx.queue.ack(lease);
}

/// Transcribe every requested language and write the subtitle files.
async fn run_pipeline(
    ctx: &ProcessorContext,
    job: &JobRecord,
) -> WorkerResult<BTreeMap<LanguageCode, PathBuf>> {
    let job_id = &job.id;

    ctx.store
        .set_progress(job_id, 5, Some("preparing source".into()))
        .await?;

    // Fail fast, no retry: these cannot heal on their own.
    let meta = fs::metadata(&job.source_path)
        .await
        .map_err(|_| MediaError::FileNotFound(job.source_path.clone()))?;
    if meta.len() == 0 {
        return Err(MediaError::EmptyAudio(job.source_path.clone()).into());
    }
    if job.languages.is_empty() {
        return Err(MediaError::NoTargetLanguages.into());
    }

    fs::create_dir_all(&ctx.artifacts_dir).await?;

    let retry_config = RetryConfig::new("transcribe")
        .with_max_retries(ctx.config.max_transcribe_retries)
        .with_base_delay(ctx.config.retry_base_delay);

    let total = job.languages.len() as u32;
    let mut artifacts = BTreeMap::new();

    for (i, language) in job.languages.iter().enumerate() {
        let base = 5 + 90 * i as u32 / total;
        ctx.store
            .set_progress(job_id, base as u8, Some(format!("transcribing {}", language)))
            .await?;
        ctx.queue.touch(job_id);

        // Bounded retries apply only to transient model failures;
        // malformed output is a defect and surfaces immediately. The
        // model call can outlast the liveness deadline, so the lease is
        // refreshed continuously while it runs.
        let segments = with_heartbeat(
            ctx,
            job_id,
            retry_async(&retry_config, MediaError::is_transient, || {
                ctx.transcriber.transcribe(&job.source_path, language)
            }),
        )
        .await?;

        let srt = encode_srt(&segments)?;

        let dest = ctx.artifact_path(job_id, language);
        let tmp = dest.with_extension("srt.tmp");
        fs::write(&tmp, srt.as_bytes()).await?;
        fs::rename(&tmp, &dest).await?;
        artifacts.insert(language.clone(), dest);

        let done = 5 + 90 * (i as u32 + 1) / total;
        ctx.store
            .set_progress(job_id, done as u8, Some(format!("encoded {}", language)))
            .await?;
        ctx.queue.touch(job_id);
    }

    Ok(artifacts)
}

/// Drive a future while periodically touching the job's lease, so a
/// long model call is never mistaken for a dead worker and requeued
/// out from under the slot that owns it.
async fn with_heartbeat<F, T>(ctx: &ProcessorContext, job_id: &JobId, fut: F) -> T
where
    F: Future<Output = T>,
{
    let mut ticker = tokio::time::interval(ctx.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return out,
            _ = ticker.tick() => ctx.queue.touch(job_id),
        }
    }
}
