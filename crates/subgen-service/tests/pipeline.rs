//! End-to-end pipeline tests against the service facade with fake
//! transcribers standing in for the Whisper CLI.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

use subgen_media::{MediaError, MediaResult, Transcriber};
use subgen_models::{ErrorKind, JobId, JobState, LanguageCode, TranscriptSegment};
use subgen_service::{ServiceConfig, ServiceError, SubtitleService};
use subgen_worker::WorkerConfig;

fn segments() -> Vec<TranscriptSegment> {
    vec![
        TranscriptSegment::new(0.0, 1.2, "hello"),
        TranscriptSegment::new(1.2, 3.5, "world"),
    ]
}

const EXPECTED_SRT: &str =
    "1\n00:00:00,000 --> 00:00:01,200\nhello\n\n2\n00:00:01,200 --> 00:00:03,500\nworld\n\n";

/// Always succeeds with a fixed transcript.
struct FixedTranscriber;

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>> {
        Ok(segments())
    }
}

/// Fails every attempt with a permanent model error.
struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>> {
        Err(MediaError::model("model exploded", false))
    }
}

/// Fails transiently a set number of times, then succeeds.
struct FlakyTranscriber {
    failures: AtomicU32,
}

#[async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MediaError::model("out of memory", true));
        }
        Ok(segments())
    }
}

/// Blocks until released, counting concurrent calls. Lets tests hold a
/// job in Running and detect double-processing.
struct GatedTranscriber {
    started: Notify,
    // Semaphore rather than Notify: releases must accumulate even when
    // no call is parked on the gate yet, or back-to-back releases
    // coalesce and a later transcribe call waits forever.
    gate: Semaphore,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl GatedTranscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            gate: Semaphore::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        })
    }

    fn release_one(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Transcriber for GatedTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.notify_one();
        self.gate.acquire().await.unwrap().forget();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(segments())
    }
}

fn test_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        data_dir: dir.path().to_path_buf(),
        languages: vec![LanguageCode::new("ko"), LanguageCode::new("en")],
        grace_period: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(3600),
        worker: WorkerConfig {
            slots: 2,
            max_transcribe_retries: 2,
            retry_base_delay: Duration::from_millis(5),
            claim_interval: Duration::from_millis(50),
            liveness_deadline: Duration::from_secs(300),
            heartbeat_interval: Duration::from_millis(20),
        },
    }
}

async fn service_with(
    dir: &TempDir,
    transcriber: Arc<dyn Transcriber>,
) -> Arc<SubtitleService> {
    let service = SubtitleService::new(test_config(dir), transcriber)
        .await
        .expect("open service");
    Arc::new(service)
}

async fn wait_terminal(service: &SubtitleService, id: &JobId) -> subgen_models::JobStatusView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let view = service.poll(id).await.expect("poll job");
        if view.is_terminal() {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never settled (state {})",
            id,
            view.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_transcribe_download_round_trip() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    assert_eq!(view.state, JobState::Queued);
    assert_eq!(view.progress, 0);
    assert!(view.available_languages.is_empty());

    let done = wait_terminal(&service, &view.job_id).await;
    assert_eq!(done.state, JobState::Succeeded);
    assert_eq!(done.progress, 100);
    assert_eq!(
        done.available_languages,
        vec![LanguageCode::new("en"), LanguageCode::new("ko")]
    );

    for lang in ["ko", "en"] {
        let (bytes, filename) = service
            .fetch_artifact(&view.job_id, &LanguageCode::new(lang))
            .await
            .unwrap();
        assert_eq!(filename, format!("talk_{}.srt", lang));
        assert_eq!(String::from_utf8(bytes).unwrap(), EXPECTED_SRT);
    }

    service.shutdown();
}

#[tokio::test]
async fn rejected_uploads_create_no_job() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;

    let empty = service.submit(b"", "talk.wav").await;
    assert!(matches!(empty, Err(ServiceError::InvalidInput(_))));

    let bad_ext = service.submit(b"data", "talk.xyz").await;
    assert!(matches!(bad_ext, Err(ServiceError::InvalidInput(_))));

    let no_ext = service.submit(b"data", "talk").await;
    assert!(matches!(no_ext, Err(ServiceError::InvalidInput(_))));

    // No media directory entries were left behind
    let mut entries = tokio::fs::read_dir(dir.path().join("media")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn model_failure_is_recorded_on_the_job() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FailingTranscriber)).await;
    service.start();

    let view = service.submit(b"fake media", "talk.mp4").await.unwrap();
    let done = wait_terminal(&service, &view.job_id).await;

    assert_eq!(done.state, JobState::Failed);
    let err = done.error.expect("failure cause recorded");
    assert_eq!(err.kind, ErrorKind::Model);
    assert!(err.message.contains("model exploded"));

    let download = service
        .fetch_artifact(&view.job_id, &LanguageCode::new("ko"))
        .await;
    assert!(matches!(download, Err(ServiceError::NotFound(_))));

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let service = service_with(
        &dir,
        Arc::new(FlakyTranscriber {
            failures: AtomicU32::new(2),
        }),
    )
    .await;
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    let done = wait_terminal(&service, &view.job_id).await;
    assert_eq!(done.state, JobState::Succeeded);

    service.shutdown();
}

#[tokio::test]
async fn cancel_while_queued_fails_the_job() {
    let dir = TempDir::new().unwrap();
    // Workers never start, so the job stays queued
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    let after = service.cancel(&view.job_id).await.unwrap();

    assert_eq!(after.state, JobState::Failed);
    assert_eq!(after.error.unwrap().kind, ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_while_running_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let gated = GatedTranscriber::new();
    let service = service_with(&dir, gated.clone()).await;
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    gated.started.notified().await;

    let after = service.cancel(&view.job_id).await.unwrap();
    assert_eq!(after.state, JobState::Running);

    // The job runs to completion regardless (two languages, two gates)
    gated.release_one();
    gated.release_one();
    let done = wait_terminal(&service, &view.job_id).await;
    assert_eq!(done.state, JobState::Succeeded);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn slots_bound_concurrency_and_every_job_settles() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;
    service.start();

    let mut ids = Vec::new();
    for i in 0..8 {
        let view = service
            .submit(b"fake media", &format!("clip-{}.wav", i))
            .await
            .unwrap();
        ids.push(view.job_id);
    }

    for id in &ids {
        let done = wait_terminal(&service, id).await;
        assert_eq!(done.state, JobState::Succeeded);
    }

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn no_job_runs_on_two_slots_at_once() {
    let dir = TempDir::new().unwrap();
    let gated = GatedTranscriber::new();
    let service = service_with(&dir, gated.clone()).await;
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    gated.started.notified().await;
    // Duplicate enqueue attempts must not produce a second claim
    for _ in 0..4 {
        gated.release_one();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    wait_terminal(&service, &view.job_id).await;

    assert_eq!(gated.max_in_flight.load(Ordering::SeqCst), 1);
    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn subscription_starts_with_snapshot_and_ends_at_terminal() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    let mut updates = service.subscribe(&view.job_id).await.unwrap();

    let first = updates.next().await.expect("initial snapshot");
    assert_eq!(first.state, JobState::Queued);

    service.start();

    let mut last_progress = first.progress;
    let mut last = first;
    while let Some(update) = updates.next().await {
        assert!(update.progress >= last_progress, "progress went backwards");
        last_progress = update.progress;
        last = update;
    }
    // Stream closed exactly at the terminal transition
    assert_eq!(last.state, JobState::Succeeded);

    service.shutdown();
}

#[tokio::test]
async fn subscribing_to_a_settled_job_yields_one_snapshot() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    wait_terminal(&service, &view.job_id).await;

    let mut updates = service.subscribe(&view.job_id).await.unwrap();
    let only = updates.next().await.expect("terminal snapshot");
    assert_eq!(only.state, JobState::Succeeded);
    assert!(updates.next().await.is_none());

    service.shutdown();
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, Arc::new(FixedTranscriber)).await;
    let ghost = JobId::new();

    assert!(matches!(service.poll(&ghost).await, Err(ServiceError::NotFound(_))));
    assert!(matches!(service.cancel(&ghost).await, Err(ServiceError::NotFound(_))));
    assert!(service.subscribe(&ghost).await.is_err());
    assert!(service
        .fetch_artifact(&ghost, &LanguageCode::new("ko"))
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn retention_reaps_expired_jobs() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.grace_period = Duration::ZERO;
    config.sweep_interval = Duration::from_millis(20);

    let service = Arc::new(
        SubtitleService::new(config, Arc::new(FixedTranscriber))
            .await
            .unwrap(),
    );
    service.start();

    let view = service.submit(b"fake media", "talk.wav").await.unwrap();
    wait_terminal(&service, &view.job_id).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match service.poll(&view.job_id).await {
            Err(ServiceError::NotFound(_)) => break,
            Ok(_) => {
                assert!(tokio::time::Instant::now() < deadline, "job was never reaped");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => panic!("unexpected poll error: {}", e),
        }
    }

    let download = service
        .fetch_artifact(&view.job_id, &LanguageCode::new("ko"))
        .await;
    assert!(matches!(download, Err(ServiceError::NotFound(_))));

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_jobs_are_recovered_on_restart() {
    let dir = TempDir::new().unwrap();

    // First process: accept a job but never start workers
    let first = service_with(&dir, Arc::new(FixedTranscriber)).await;
    let view = first.submit(b"fake media", "talk.wav").await.unwrap();
    first.shutdown();
    drop(first);

    // Second process over the same data directory picks it up
    let second = service_with(&dir, Arc::new(FixedTranscriber)).await;
    let recovered = second.poll(&view.job_id).await.unwrap();
    assert_eq!(recovered.state, JobState::Queued);

    second.start();
    let done = wait_terminal(&second, &view.job_id).await;
    assert_eq!(done.state, JobState::Succeeded);

    second.shutdown();
}
