use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use super::job_store_traits::JobStore;
use crate::clock::Clock;
use crate::errors::{Error, Result};
use crate::sync::{
    JobFilter, JobOutcome, JobPage, JobStatus, JobTrigger, ProgressDelta, SyncJob, SyncType,
};

/// Message recorded on jobs found active at startup.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Owns the lifecycle of sync jobs.
///
/// Every mutation is a read-modify-write of the stored job, serialized through
/// one lock so progress from the executor and a concurrent cancel request
/// never overwrite each other. Cancel flags are mirrored in memory so the
/// executor can poll them without touching storage.
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    error_log_capacity: usize,
    write_lock: Mutex<()>,
    cancel_flags: DashSet<String>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, error_log_capacity: usize) -> Self {
        Self {
            store,
            clock,
            error_log_capacity,
            write_lock: Mutex::new(()),
            cancel_flags: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Current time on the tracker's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Enqueue a new job, failing with `AlreadyRunning` if the sync type is busy.
    pub async fn create(&self, sync_type: SyncType, trigger: JobTrigger) -> Result<SyncJob> {
        let job = SyncJob::new(sync_type, trigger, self.clock.now());
        match self.store.create_job_if_idle(job).await {
            Ok(job) => {
                info!(
                    "Queued {} sync job {} ({})",
                    sync_type,
                    job.id,
                    job.trigger.as_str()
                );
                Ok(job)
            }
            Err(e) => {
                if e.is_already_running() {
                    debug!("Rejected {} sync: another run is active", sync_type);
                }
                Err(e)
            }
        }
    }

    /// Move a queued job to running.
    pub async fn start(&self, job_id: &str) -> Result<SyncJob> {
        let now = self.clock.now();
        let job = self.mutate(job_id, |job| job.start(now)).await?;
        info!("Started {} sync job {}", job.sync_type, job.id);
        Ok(job)
    }

    /// Add counters and log entries to a running job.
    pub async fn update_progress(&self, job_id: &str, delta: ProgressDelta) -> Result<SyncJob> {
        let now = self.clock.now();
        let capacity = self.error_log_capacity;
        self.mutate(job_id, move |job| {
            if job.status != JobStatus::Running {
                return Err(Error::Validation(format!(
                    "job {} is {}; progress is only recorded while running",
                    job.id, job.status
                )));
            }
            job.apply_progress(delta, capacity, now);
            Ok(())
        })
        .await
    }

    /// Finish a job with its terminal outcome.
    pub async fn complete(&self, job_id: &str, outcome: JobOutcome) -> Result<SyncJob> {
        let now = self.clock.now();
        let job = self
            .mutate_then(
                job_id,
                |job| job.finish(outcome, now),
                |job| {
                    self.cancel_flags.remove(&job.id);
                },
            )
            .await?;

        match job.status {
            JobStatus::Failed => warn!(
                "{} sync job {} failed after {} items: {}",
                job.sync_type,
                job.id,
                job.processed_items,
                job.last_error.as_deref().unwrap_or("unknown error")
            ),
            _ => info!(
                "{} sync job {} {}: {} processed, {} created, {} updated, {} skipped, {} errors",
                job.sync_type,
                job.id,
                job.status,
                job.processed_items,
                job.created_count,
                job.updated_count,
                job.skipped_count,
                job.error_count
            ),
        }
        Ok(job)
    }

    /// Request cancellation.
    ///
    /// A queued job is cancelled on the spot. A running job gets its cancel
    /// flag set and stops at the executor's next item or page boundary.
    /// Terminal jobs cannot be cancelled.
    pub async fn cancel(&self, job_id: &str) -> Result<SyncJob> {
        let now = self.clock.now();
        let job = self
            .mutate_then(
                job_id,
                |job| match job.status {
                    JobStatus::Queued => job.finish(JobOutcome::Cancelled, now),
                    JobStatus::Running => {
                        job.cancel_requested = true;
                        job.updated_at = now;
                        Ok(())
                    }
                    status => Err(Error::InvalidTransition {
                        job_id: job.id.clone(),
                        from: status,
                        to: JobStatus::Cancelled,
                    }),
                },
                // Still under the write lock, so `complete` cannot run first.
                |job| {
                    if job.status == JobStatus::Running {
                        self.cancel_flags.insert(job.id.clone());
                    }
                },
            )
            .await?;

        if job.status == JobStatus::Running {
            info!("Cancellation requested for {} sync job {}", job.sync_type, job.id);
        } else {
            info!("Cancelled queued {} sync job {}", job.sync_type, job.id);
        }
        Ok(job)
    }

    /// Whether a cancel was requested for a job. Cheap; no storage access.
    pub fn is_cancel_requested(&self, job_id: &str) -> bool {
        self.cancel_flags.contains(job_id)
    }

    pub fn get(&self, job_id: &str) -> Result<SyncJob> {
        self.store.get_job(job_id)
    }

    pub fn list(&self, filter: &JobFilter) -> Result<JobPage> {
        self.store.list_jobs(filter)
    }

    /// Fail every job a previous process left queued or running.
    ///
    /// Must run before any new job is dispatched, otherwise orphaned rows hold
    /// the single-flight slot of their sync type forever.
    pub async fn recover_interrupted(&self) -> Result<Vec<SyncJob>> {
        let orphans = self.store.list_active_jobs()?;
        let mut recovered = Vec::with_capacity(orphans.len());

        for orphan in orphans {
            let now = self.clock.now();
            let job = self
                .mutate(&orphan.id, |job| {
                    job.finish(
                        JobOutcome::Failed {
                            error: INTERRUPTED_BY_RESTART.to_string(),
                        },
                        now,
                    )
                })
                .await?;
            warn!(
                "Marked {} sync job {} as failed: {}",
                job.sync_type, job.id, INTERRUPTED_BY_RESTART
            );
            recovered.push(job);
        }
        Ok(recovered)
    }

    async fn mutate<F>(&self, job_id: &str, apply: F) -> Result<SyncJob>
    where
        F: FnOnce(&mut SyncJob) -> Result<()> + Send,
    {
        self.mutate_then(job_id, apply, |_| {}).await
    }

    /// Like `mutate`, running `saved` on the stored job before the write
    /// lock is released.
    async fn mutate_then<F, S>(&self, job_id: &str, apply: F, saved: S) -> Result<SyncJob>
    where
        F: FnOnce(&mut SyncJob) -> Result<()> + Send,
        S: FnOnce(&SyncJob) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut job = self.store.get_job(job_id)?;
        apply(&mut job)?;
        let job = self.store.update_job(job).await?;
        saved(&job);
        Ok(job)
    }
}
