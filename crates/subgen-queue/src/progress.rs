//! Progress events via per-job broadcast channels.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use subgen_models::{JobId, JobStatusView};

/// Buffered events per subscriber before lagging kicks in.
const CHANNEL_CAPACITY: usize = 64;

/// Channel for publishing/subscribing to job status transitions.
///
/// Each job gets its own broadcast channel. Publishing a terminal view
/// drops the sender, which closes every subscriber's stream — the
/// server-side end of a push subscription.
#[derive(Default)]
pub struct ProgressChannel {
    senders: Mutex<HashMap<JobId, broadcast::Sender<JobStatusView>>>,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a status snapshot for a job.
    ///
    /// Safe to call with no subscribers. A terminal snapshot closes the
    /// job's channel after delivery.
    pub fn publish(&self, view: &JobStatusView) {
        let mut senders = self.senders.lock().expect("progress lock poisoned");

        if view.is_terminal() {
            if let Some(sender) = senders.remove(&view.job_id) {
                let _ = sender.send(view.clone());
                debug!(job_id = %view.job_id, state = %view.state, "closed progress channel");
            }
            return;
        }

        let sender = senders
            .entry(view.job_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        // Err means no live subscribers, which is fine
        let _ = sender.send(view.clone());
    }

    /// Subscribe to future status transitions for a job.
    ///
    /// The caller is responsible for first reading the current snapshot
    /// from the store; only transitions after this call are delivered.
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<JobStatusView> {
        let mut senders = self.senders.lock().expect("progress lock poisoned");
        senders
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop a job's channel without a terminal publish (used when a
    /// record is evicted by retention).
    pub fn drop_channel(&self, job_id: &JobId) {
        let mut senders = self.senders.lock().expect("progress lock poisoned");
        senders.remove(job_id);
    }

    /// Number of jobs with an open channel.
    pub fn open_channels(&self) -> usize {
        self.senders.lock().expect("progress lock poisoned").len()
    }
}
