use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::cron_evaluator::CronEvaluator;
use crate::clock::Clock;
use crate::dispatcher::JobDispatcher;
use crate::errors::{Error, Result};
use crate::jobs::JobStore;
use crate::sync::{JobTrigger, ScheduleUpdate, SyncSchedule, SyncType};

/// What one scheduler tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Ids of jobs created and dispatched
    pub dispatched: Vec<String>,
    /// Due schedules whose sync type was still busy
    pub skipped_already_running: Vec<SyncType>,
    /// Due schedules that could not be dispatched for another reason
    pub failed: Vec<SyncType>,
    /// Set when the schedules could not be read at all
    pub error: Option<String>,
}

/// Fires due schedules on a fixed tick.
///
/// Each due schedule goes through the same create-then-dispatch path as a
/// manual trigger. Whatever the outcome, `next_run_at` moves to the first
/// cron occurrence after now, so missed occurrences never pile up.
///
/// Every schedule write happens under `schedule_lock` as a fresh
/// read-modify-write, so a tick never overwrites an edit made while it was
/// dispatching.
pub struct Scheduler {
    dispatcher: Arc<JobDispatcher>,
    cron: Arc<dyn CronEvaluator>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    schedule_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        dispatcher: Arc<JobDispatcher>,
        cron: Arc<dyn CronEvaluator>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            cron,
            clock,
            tick_interval,
            schedule_lock: Mutex::new(()),
        }
    }

    fn store(&self) -> &Arc<dyn JobStore> {
        self.dispatcher.tracker().store()
    }

    /// Evaluate every enabled schedule once.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let schedules = match self.store().list_schedules() {
            Ok(schedules) => schedules,
            Err(e) => {
                error!("Scheduler tick skipped, schedules unavailable: {}", e);
                report.error = Some(e.to_string());
                return report;
            }
        };

        for schedule in schedules.into_iter().filter(|s| s.enabled) {
            let sync_type = schedule.sync_type;
            if schedule.next_run_at.is_none() {
                // Loaded without a computed next run; arm it and wait.
                if let Err(e) = self.advance(sync_type, now, None).await {
                    error!("Could not arm {} schedule: {}", sync_type, e);
                    report.failed.push(sync_type);
                }
                continue;
            }
            if !schedule.is_due(now) {
                continue;
            }

            let mut run_job_id = None;
            match self
                .dispatcher
                .dispatch(sync_type, JobTrigger::Scheduled)
                .await
            {
                Ok(job) => {
                    info!("Scheduled {} sync dispatched as job {}", sync_type, job.id);
                    run_job_id = Some(job.id.clone());
                    report.dispatched.push(job.id);
                }
                Err(e) if e.is_already_running() => {
                    debug!(
                        "Scheduled {} sync skipped: previous run still active",
                        sync_type
                    );
                    report.skipped_already_running.push(sync_type);
                }
                Err(e) => {
                    warn!("Scheduled {} sync not dispatched: {}", sync_type, e);
                    report.failed.push(sync_type);
                }
            }

            if let Err(e) = self.advance(sync_type, now, run_job_id).await {
                error!("Could not advance {} schedule: {}", sync_type, e);
                if !report.failed.contains(&sync_type) {
                    report.failed.push(sync_type);
                }
            }
        }

        report
    }

    /// Re-read the stored schedule, record the dispatched job and move
    /// `next_run_at` to the first occurrence after `now`.
    ///
    /// Cron expression and enabled flag are taken from the stored copy. A
    /// schedule disabled in the meantime stays unarmed.
    async fn advance(
        &self,
        sync_type: SyncType,
        now: DateTime<Utc>,
        run_job_id: Option<String>,
    ) -> Result<()> {
        let _guard = self.schedule_lock.lock().await;
        let Some(mut schedule) = self.store().get_schedule(sync_type)? else {
            return Ok(());
        };

        let recorded_run = run_job_id.is_some();
        if recorded_run {
            schedule.last_run_job_id = run_job_id;
        }
        if schedule.enabled {
            schedule.next_run_at = self.cron.next_after(&schedule.cron_expression, now)?;
        } else if !recorded_run {
            return Ok(());
        }

        schedule.updated_at = now;
        self.store().save_schedule(schedule).await?;
        Ok(())
    }

    /// Spawn the tick loop. The first tick runs immediately.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let scheduler = self;

        let task = tokio::spawn(async move {
            info!(
                "Sync scheduler started ({}s tick)",
                scheduler.tick_interval.as_secs()
            );
            let mut interval = tokio::time::interval(scheduler.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let report = scheduler.tick().await;
                        if !report.dispatched.is_empty() {
                            debug!("Scheduler tick dispatched {} job(s)", report.dispatched.len());
                        }
                    }
                }
            }
            info!("Sync scheduler stopped");
        });

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Create or replace the schedule of a sync type.
    pub async fn set_schedule(
        &self,
        sync_type: SyncType,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<SyncSchedule> {
        if !self.dispatcher.registry().is_registered(sync_type) {
            return Err(Error::UnknownSyncType(sync_type.to_string()));
        }
        self.cron.validate(cron_expression)?;

        let _guard = self.schedule_lock.lock().await;
        let now = self.clock.now();
        let mut schedule = SyncSchedule::new(sync_type, cron_expression.trim(), enabled, now);
        if let Some(existing) = self.store().get_schedule(sync_type)? {
            schedule.last_run_job_id = existing.last_run_job_id;
        }
        self.rearm(&mut schedule, now)?;

        let saved = self.store().save_schedule(schedule).await?;
        info!(
            "{} schedule set to '{}' ({})",
            saved.sync_type,
            saved.cron_expression,
            if saved.enabled { "enabled" } else { "disabled" }
        );
        Ok(saved)
    }

    /// Change the cron expression and/or enabled flag of an existing schedule.
    pub async fn update_schedule(
        &self,
        sync_type: SyncType,
        update: ScheduleUpdate,
    ) -> Result<SyncSchedule> {
        let _guard = self.schedule_lock.lock().await;
        let mut schedule = self
            .store()
            .get_schedule(sync_type)?
            .ok_or_else(|| Error::ScheduleNotFound(sync_type.to_string()))?;

        if let Some(expression) = update.cron_expression {
            self.cron.validate(&expression)?;
            schedule.cron_expression = expression.trim().to_string();
        }
        if let Some(enabled) = update.enabled {
            schedule.enabled = enabled;
        }

        let now = self.clock.now();
        schedule.updated_at = now;
        self.rearm(&mut schedule, now)?;

        let saved = self.store().save_schedule(schedule).await?;
        info!(
            "{} schedule updated: '{}' ({})",
            saved.sync_type,
            saved.cron_expression,
            if saved.enabled { "enabled" } else { "disabled" }
        );
        Ok(saved)
    }

    pub fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        self.store().list_schedules()
    }

    fn rearm(&self, schedule: &mut SyncSchedule, now: DateTime<Utc>) -> Result<()> {
        schedule.next_run_at = if schedule.enabled {
            self.cron.next_after(&schedule.cron_expression, now)?
        } else {
            None
        };
        Ok(())
    }
}

/// Handle to a running tick loop.
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the tick loop and wait for it to exit. Runs already dispatched
    /// keep going.
    pub async fn shutdown(self) {
        let SchedulerHandle { shutdown, task } = self;
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        if let Err(e) = task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
