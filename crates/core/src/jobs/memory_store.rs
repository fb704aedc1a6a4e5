//! In-process job store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use log::warn;

use super::job_store_traits::JobStore;
use crate::errors::{Error, Result};
use crate::sync::{JobFilter, JobPage, SyncJob, SyncSchedule, SyncType};

/// A `JobStore` kept in memory. Nothing survives the process.
///
/// The single-flight check and the insert happen under one write lock, which
/// gives the same atomicity as the SQLite store's immediate transaction.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, SyncJob>>,
    schedules: RwLock<HashMap<SyncType, SyncSchedule>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, SyncJob>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            warn!("Job map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, SyncJob>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            warn!("Job map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_schedules(&self) -> RwLockReadGuard<'_, HashMap<SyncType, SyncSchedule>> {
        self.schedules.read().unwrap_or_else(|poisoned| {
            warn!("Schedule map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_schedules(&self) -> RwLockWriteGuard<'_, HashMap<SyncType, SyncSchedule>> {
        self.schedules.write().unwrap_or_else(|poisoned| {
            warn!("Schedule map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Newest first; ids are time-ordered so they break ties on equal timestamps.
fn sort_newest_first(jobs: &mut [SyncJob]) {
    jobs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job_if_idle(&self, job: SyncJob) -> Result<SyncJob> {
        let mut jobs = self.write_jobs();

        let busy = jobs
            .values()
            .any(|existing| existing.sync_type == job.sync_type && existing.status.is_active());
        if busy {
            return Err(Error::AlreadyRunning {
                sync_type: job.sync_type,
            });
        }

        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn update_job(&self, job: SyncJob) -> Result<SyncJob> {
        let mut jobs = self.write_jobs();
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(job)
            }
            None => Err(Error::JobNotFound(job.id)),
        }
    }

    fn get_job(&self, job_id: &str) -> Result<SyncJob> {
        self.read_jobs()
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage> {
        let mut matching: Vec<SyncJob> = self
            .read_jobs()
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        sort_newest_first(&mut matching);

        let total = matching.len();
        let jobs = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(JobPage { jobs, total })
    }

    fn list_active_jobs(&self) -> Result<Vec<SyncJob>> {
        let mut active: Vec<SyncJob> = self
            .read_jobs()
            .values()
            .filter(|job| job.status.is_active())
            .cloned()
            .collect();
        sort_newest_first(&mut active);
        Ok(active)
    }

    async fn save_schedule(&self, schedule: SyncSchedule) -> Result<SyncSchedule> {
        self.write_schedules()
            .insert(schedule.sync_type, schedule.clone());
        Ok(schedule)
    }

    fn get_schedule(&self, sync_type: SyncType) -> Result<Option<SyncSchedule>> {
        Ok(self.read_schedules().get(&sync_type).cloned())
    }

    fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        let mut schedules: Vec<SyncSchedule> = self.read_schedules().values().cloned().collect();
        schedules.sort_by_key(|s| s.sync_type);
        Ok(schedules)
    }
}
