//! Externally visible job status projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobError, JobId, JobRecord, JobState};
use crate::language::LanguageCode;

/// Snapshot of a job safe to expose to callers.
///
/// This is the payload for both polling and push subscriptions. It
/// deliberately carries no filesystem paths: artifact availability is
/// reported as the set of language codes ready for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    /// Job handle
    pub job_id: JobId,
    /// Filename as declared at upload
    pub original_filename: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Progress (0-100)
    pub progress: u8,
    /// Current processing step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Failure cause, present iff Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Languages with a downloadable subtitle artifact
    pub available_languages: Vec<LanguageCode>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusView {
    /// Check if no further updates will be published for this job.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl From<&JobRecord> for JobStatusView {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id.clone(),
            original_filename: job.original_filename.clone(),
            state: job.state,
            progress: job.progress,
            phase: job.phase.clone(),
            error: job.error.clone(),
            available_languages: job.artifacts.keys().cloned().collect(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}
