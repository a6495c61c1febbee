//! FIFO job hand-off with leases.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use subgen_models::JobId;

/// A claimed job. Held by exactly one worker slot until acked or
/// reclaimed by the supervisor.
#[derive(Debug, Clone)]
pub struct Lease {
    pub job_id: JobId,
    pub consumer: String,
    last_touch: Instant,
}

impl Lease {
    /// Time since the worker last signalled liveness for this lease.
    pub fn idle(&self) -> Duration {
        self.last_touch.elapsed()
    }
}

#[derive(Default)]
struct QueueInner {
    ready: VecDeque<JobId>,
    leases: HashMap<JobId, Lease>,
}

/// In-process FIFO queue of job ids with at-least-once delivery.
///
/// Claimed jobs are tracked as leases. A worker that crashes leaves its
/// lease behind; once it has been idle past the liveness deadline the
/// supervisor finds it via [`stuck_leases`](Self::stuck_leases) and
/// [`release`](Self::release)s the job back to the front of the ready
/// queue.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl JobQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job id. Duplicate ids (already ready or leased) are
    /// ignored so a retried producer cannot cause double-processing.
    pub fn enqueue(&self, job_id: JobId) {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            if inner.leases.contains_key(&job_id) || inner.ready.contains(&job_id) {
                warn!(job_id = %job_id, "duplicate enqueue ignored");
                return;
            }
            inner.ready.push_back(job_id);
        }
        self.notify.notify_one();
    }

    /// Claim the next job, waiting until one is available.
    pub async fn claim(&self, consumer: &str) -> Lease {
        loop {
            if let Some(lease) = self.try_claim(consumer) {
                return lease;
            }
            self.notify.notified().await;
        }
    }

    /// Claim the next job if one is ready.
    pub fn try_claim(&self, consumer: &str) -> Option<Lease> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let job_id = inner.ready.pop_front()?;
        let lease = Lease {
            job_id: job_id.clone(),
            consumer: consumer.to_string(),
            last_touch: Instant::now(),
        };
        inner.leases.insert(job_id, lease.clone());
        debug!(job_id = %lease.job_id, consumer, "claimed job");
        Some(lease)
    }

    /// Acknowledge a lease after the job reached a terminal state.
    pub fn ack(&self, lease: &Lease) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.leases.remove(&lease.job_id);
        debug!(job_id = %lease.job_id, "acked job");
    }

    /// Refresh the liveness timestamp of a claimed job.
    pub fn touch(&self, job_id: &JobId) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if let Some(lease) = inner.leases.get_mut(job_id) {
            lease.last_touch = Instant::now();
        }
    }

    /// Remove a still-queued job (cancellation). Returns false if the
    /// job was not in the ready queue, i.e. already claimed or unknown.
    pub fn remove(&self, job_id: &JobId) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let before = inner.ready.len();
        inner.ready.retain(|id| id != job_id);
        before != inner.ready.len()
    }

    /// Leased jobs whose lease has been idle past `min_idle`. The
    /// leases stay in place; the supervisor decides per job whether to
    /// [`release`](Self::release) or [`forget`](Self::forget) them
    /// after resetting the store record, so a racing slot can never
    /// claim a job whose record still says Running.
    pub fn stuck_leases(&self, min_idle: Duration) -> Vec<JobId> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner
            .leases
            .values()
            .filter(|lease| lease.idle() >= min_idle)
            .map(|lease| lease.job_id.clone())
            .collect()
    }

    /// Drop a lease and put the job back at the *front* of the ready
    /// queue, so recovered work is not penalized. Returns false if no
    /// such lease existed.
    pub fn release(&self, job_id: &JobId) -> bool {
        let released = {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            if inner.leases.remove(job_id).is_none() {
                return false;
            }
            inner.ready.push_front(job_id.clone());
            true
        };
        info!(job_id = %job_id, "released stuck job back to queue");
        self.notify.notify_one();
        released
    }

    /// Drop a lease without re-queueing (the job turned out to be
    /// terminal or evicted). Returns false if no such lease existed.
    pub fn forget(&self, job_id: &JobId) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.leases.remove(job_id).is_some()
    }

    /// Number of jobs waiting to be claimed.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").ready.len()
    }

    /// Whether the ready queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of claimed, unacked jobs.
    pub fn leased(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").leases.len()
    }
}
