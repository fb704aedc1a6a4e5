//! Progress reporting hooks for running jobs.

use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::sync::SyncJob;

/// Receives job snapshots as a run advances.
///
/// Called on the executor's task after the job state has been persisted, so
/// implementations must be fast and must not block.
pub trait JobProgressReporter: Send + Sync {
    fn job_started(&self, job: &SyncJob);

    /// `page` is 1-based.
    fn page_processed(&self, job: &SyncJob, page: usize);

    fn job_finished(&self, job: &SyncJob);
}

/// Discards every report.
#[derive(Clone, Default)]
pub struct NoOpProgressReporter;

impl JobProgressReporter for NoOpProgressReporter {
    fn job_started(&self, _job: &SyncJob) {}

    fn page_processed(&self, _job: &SyncJob, _page: usize) {}

    fn job_finished(&self, _job: &SyncJob) {}
}

/// Writes reports to the `log` facade.
#[derive(Clone, Default)]
pub struct LogProgressReporter;

impl JobProgressReporter for LogProgressReporter {
    fn job_started(&self, job: &SyncJob) {
        debug!("{} sync job {} running", job.sync_type, job.id);
    }

    fn page_processed(&self, job: &SyncJob, page: usize) {
        match job.total_items {
            Some(total) => info!(
                "{} sync job {}: page {} done, {}/{} items",
                job.sync_type, job.id, page, job.processed_items, total
            ),
            None => info!(
                "{} sync job {}: page {} done, {} items",
                job.sync_type, job.id, page, job.processed_items
            ),
        }
    }

    fn job_finished(&self, job: &SyncJob) {
        debug!("{} sync job {} finished as {}", job.sync_type, job.id, job.status);
    }
}

/// One report received by [`MockProgressReporter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { job_id: String },
    Page { job_id: String, page: usize, processed: u64 },
    Finished { job_id: String, status: crate::sync::JobStatus },
}

/// Collects reports for assertions.
#[derive(Clone, Default)]
pub struct MockProgressReporter {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MockProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

impl JobProgressReporter for MockProgressReporter {
    fn job_started(&self, job: &SyncJob) {
        self.push(ProgressEvent::Started {
            job_id: job.id.clone(),
        });
    }

    fn page_processed(&self, job: &SyncJob, page: usize) {
        self.push(ProgressEvent::Page {
            job_id: job.id.clone(),
            page,
            processed: job.processed_items,
        });
    }

    fn job_finished(&self, job: &SyncJob) {
        self.push(ProgressEvent::Finished {
            job_id: job.id.clone(),
            status: job.status,
        });
    }
}
