use async_trait::async_trait;

use crate::errors::Result;
use crate::sync::{JobFilter, JobPage, SyncJob, SyncSchedule, SyncType};

/// Persistence for sync jobs and schedules.
///
/// Reads are synchronous; writes are async so implementations can funnel them
/// through a single writer.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert `job` unless a queued or running job of the same sync type
    /// exists, as one indivisible check-and-insert.
    ///
    /// Fails with `Error::AlreadyRunning` when the slot is taken.
    async fn create_job_if_idle(&self, job: SyncJob) -> Result<SyncJob>;

    /// Replace a stored job. Fails with `Error::JobNotFound` for unknown ids.
    async fn update_job(&self, job: SyncJob) -> Result<SyncJob>;

    fn get_job(&self, job_id: &str) -> Result<SyncJob>;

    /// Jobs matching `filter`, newest first.
    fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage>;

    /// Jobs currently queued or running, across all sync types.
    fn list_active_jobs(&self) -> Result<Vec<SyncJob>>;

    /// Create or replace the schedule of `schedule.sync_type`.
    async fn save_schedule(&self, schedule: SyncSchedule) -> Result<SyncSchedule>;

    fn get_schedule(&self, sync_type: SyncType) -> Result<Option<SyncSchedule>>;

    fn list_schedules(&self) -> Result<Vec<SyncSchedule>>;
}
