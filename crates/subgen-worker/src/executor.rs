//! Worker pool: slot loops and the liveness supervisor.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::processor::{process_claimed, ProcessorContext};

/// Fixed-size pool of worker slots over a shared queue.
///
/// Each slot processes one job at a time; the configured slot count is
/// the pipeline's whole concurrency ceiling. A supervisor task watches
/// for leases whose worker stopped responding and puts those jobs back
/// to Queued, preserving at-least-once delivery.
pub struct WorkerPool {
    ctx: Arc<ProcessorContext>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Create a pool around a processing context.
    pub fn new(ctx: ProcessorContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: Arc::new(ctx),
            shutdown,
        }
    }

    /// Spawn the slot loops and the supervisor. Returns their handles.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let slots = self.ctx.config.slots;
        info!("starting worker pool with {} slots", slots);

        let mut handles = Vec::with_capacity(slots + 1);
        for slot in 0..slots {
            let ctx = Arc::clone(&self.ctx);
            let mut shutdown_rx = self.shutdown.subscribe();
            let consumer = format!("slot-{}-{}", slot, Uuid::new_v4());

            handles.push(tokio::spawn(async move {
                loop {
                    let lease = tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                debug!(consumer, "slot shutting down");
                                break;
                            }
                            continue;
                        }
                        lease = ctx.queue.claim(&consumer) => lease,
                    };

                    let job_id = lease.job_id.clone();
                    let ctx_job = Arc::clone(&ctx);
                    // Run in a child task so a panic takes out the job,
                    // not the slot; the abandoned lease is reclaimed by
                    // the supervisor.
                    let handle =
                        tokio::spawn(async move { process_claimed(&ctx_job, &lease).await });
                    if let Err(e) = handle.await {
                        error!(job_id = %job_id, "job task panicked: {}", e);
                    }
                }
            }));
        }

        handles.push(self.spawn_supervisor());
        handles
    }

    fn spawn_supervisor(&self) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ctx.config.claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        for job_id in ctx.queue.stuck_leases(ctx.config.liveness_deadline) {
                            warn!(job_id = %job_id, "lease idle past liveness deadline");
                            // Reset the record first so the re-claimed
                            // job starts from Queued, then make it
                            // claimable again.
                            match ctx.store.requeue(&job_id).await {
                                Ok(true) => {
                                    ctx.queue.release(&job_id);
                                }
                                Ok(false) => {
                                    // Terminal or never started; drop the lease
                                    ctx.queue.forget(&job_id);
                                }
                                Err(e) => {
                                    error!(job_id = %job_id, "failed to requeue stuck job: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Signal all slots and the supervisor to stop after their current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
