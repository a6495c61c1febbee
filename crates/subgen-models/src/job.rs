//! Job records and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::language::LanguageCode;

/// Unique identifier for a transcription job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// Transitions are monotone: Queued -> Running -> {Succeeded, Failed}.
/// The only path back to Queued is an explicit liveness requeue of a
/// Running job whose worker stopped responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// A worker owns the job and is transcribing
    Running,
    /// Subtitles were generated for every requested language
    Succeeded,
    /// Job failed; see the attached error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad media discovered after enqueue (missing source, empty audio,
    /// unsupported codec)
    InvalidInput,
    /// Disk or filesystem failure while persisting results
    Storage,
    /// The transcription model failed after bounded retries
    Model,
    /// The model produced segments violating the ordering contract
    MalformedSegments,
    /// User cancelled the job while it was still queued
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Storage => "storage",
            ErrorKind::Model => "model",
            ErrorKind::MalformedSegments => "malformed_segments",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Cancelled by user")
    }
}

/// One transcription request and its full lifecycle state.
///
/// The record is created at upload time, mutated only by the worker
/// that owns it (plus cancellation and liveness requeue), and destroyed
/// by the retention manager once its grace period elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID, the external handle
    pub id: JobId,

    /// Filename as declared by the uploader (used for download naming)
    pub original_filename: String,

    /// Location of the stored upload; owned by the job until reaped
    pub source_path: PathBuf,

    /// Requested subtitle target languages
    pub languages: Vec<LanguageCode>,

    /// Current lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Progress (0-100), monotone while Running
    #[serde(default)]
    pub progress: u8,

    /// Human-readable description of the current processing step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Generated subtitle files, keyed by language; non-empty iff Succeeded
    #[serde(default)]
    pub artifacts: BTreeMap<LanguageCode, PathBuf>,

    /// Failure cause; present iff Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When a worker first claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set exactly once, at the first transition into a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new record in state Queued.
    pub fn new(
        original_filename: impl Into<String>,
        source_path: impl Into<PathBuf>,
        languages: Vec<LanguageCode>,
    ) -> Self {
        Self {
            id: JobId::new(),
            original_filename: original_filename.into(),
            source_path: source_path.into(),
            languages,
            state: JobState::Queued,
            progress: 0,
            phase: None,
            artifacts: BTreeMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition Queued -> Running. Returns false if the job is not
    /// claimable (already running or terminal).
    pub fn set_running(&mut self) -> bool {
        if self.state != JobState::Queued {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Update progress while Running. Stale updates (terminal job, or a
    /// value below the current one) are ignored.
    pub fn set_progress(&mut self, progress: u8, phase: Option<String>) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        let progress = progress.min(100);
        if progress < self.progress {
            return false;
        }
        self.progress = progress;
        if phase.is_some() {
            self.phase = phase;
        }
        true
    }

    /// Transition into Succeeded with the generated artifacts. The first
    /// terminal transition wins; later calls are no-ops.
    pub fn succeed(&mut self, artifacts: BTreeMap<LanguageCode, PathBuf>) -> bool {
        if self.is_terminal() || artifacts.is_empty() {
            return false;
        }
        self.state = JobState::Succeeded;
        self.artifacts = artifacts;
        self.progress = 100;
        self.phase = Some("done".into());
        self.completed_at = Some(Utc::now());
        true
    }

    /// Transition into Failed with the given cause. The first terminal
    /// transition wins; later calls are no-ops.
    pub fn fail(&mut self, error: JobError) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Failed;
        self.error = Some(error);
        self.phase = None;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Liveness requeue: put a Running job back to Queued after its
    /// worker has been presumed dead. Progress restarts from zero.
    pub fn requeue(&mut self) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        self.state = JobState::Queued;
        self.progress = 0;
        self.phase = None;
        self.started_at = None;
        true
    }

    /// Whether the retention grace period has elapsed.
    pub fn reapable(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        match self.completed_at {
            Some(done) => self.is_terminal() && now - done >= grace,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            "lecture.mp4",
            "/tmp/subgen/j1/lecture.mp4",
            vec![LanguageCode::new("ko"), LanguageCode::new("en")],
        )
    }

    #[test]
    fn new_record_is_queued() {
        let job = record();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.artifacts.is_empty());
        assert!(!job.is_terminal());
    }

    #[test]
    fn transitions_are_monotone() {
        let mut job = record();
        assert!(job.set_running());
        assert!(job.started_at.is_some());
        // Double claim is rejected
        assert!(!job.set_running());

        let mut artifacts = BTreeMap::new();
        artifacts.insert(LanguageCode::new("ko"), PathBuf::from("/tmp/a_ko.srt"));
        assert!(job.succeed(artifacts));
        let done_at = job.completed_at.expect("completed_at set");

        // No transition out of a terminal state
        assert!(!job.fail(JobError::cancelled()));
        assert!(!job.requeue());
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.completed_at, Some(done_at));
    }

    #[test]
    fn succeed_requires_artifacts() {
        let mut job = record();
        job.set_running();
        assert!(!job.succeed(BTreeMap::new()));
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn progress_is_monotone_and_running_only() {
        let mut job = record();
        assert!(!job.set_progress(10, None));

        job.set_running();
        assert!(job.set_progress(40, Some("transcribing ko".into())));
        assert!(!job.set_progress(30, None));
        assert_eq!(job.progress, 40);
        assert_eq!(job.phase.as_deref(), Some("transcribing ko"));

        job.fail(JobError::new(ErrorKind::Model, "boom"));
        // Stale update from a dead worker must not touch a terminal job
        assert!(!job.set_progress(90, None));
        assert_eq!(job.progress, 40);
    }

    #[test]
    fn requeue_restarts_at_queued() {
        let mut job = record();
        job.set_running();
        job.set_progress(55, Some("transcribing en".into()));

        assert!(job.requeue());
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());

        // And it can be claimed again
        assert!(job.set_running());
    }

    #[test]
    fn reapable_only_after_grace() {
        let mut job = record();
        job.set_running();
        job.fail(JobError::new(ErrorKind::Model, "boom"));

        let done = job.completed_at.unwrap();
        let grace = chrono::Duration::seconds(60);
        assert!(!job.reapable(done + chrono::Duration::seconds(30), grace));
        assert!(job.reapable(done + chrono::Duration::seconds(61), grace));
    }

    #[test]
    fn record_serde_roundtrip() {
        let mut job = record();
        job.set_running();
        let mut artifacts = BTreeMap::new();
        artifacts.insert(LanguageCode::new("en"), PathBuf::from("/tmp/a_en.srt"));
        job.succeed(artifacts);

        let json = serde_json::to_string(&job).expect("serialize JobRecord");
        let decoded: JobRecord = serde_json::from_str(&json).expect("deserialize JobRecord");
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.state, JobState::Succeeded);
        assert_eq!(decoded.artifacts, job.artifacts);
        assert_eq!(decoded.completed_at, job.completed_at);
    }
}
