use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use crate::clock::Clock;
use crate::config::SyncEngineConfig;
use crate::dispatcher::JobDispatcher;
use crate::errors::Result;
use crate::executor::{BatchExecutor, JobProgressReporter, LogProgressReporter};
use crate::jobs::{JobStore, JobTracker};
use crate::ratelimit::{ApiName, RateBudget, RateLimiter};
use crate::registry::SyncRegistry;
use crate::scheduler::{CronEvaluator, CronScheduleEvaluator, Scheduler, SchedulerHandle};
use crate::sync::{JobFilter, JobPage, JobTrigger, ScheduleUpdate, SyncJob, SyncSchedule, SyncType};

/// Operations exposed to the dashboard/API layer.
///
/// Every call returns as soon as the request is recorded; runs happen in the
/// background and are observed by polling job state.
#[async_trait]
pub trait SyncServiceTrait: Send + Sync {
    /// Start a manual run. Fails with `AlreadyRunning` while another job of
    /// the same sync type is queued or running.
    async fn trigger_sync(&self, sync_type: SyncType) -> Result<SyncJob>;

    /// Request cancellation of a queued or running job.
    async fn cancel_job(&self, job_id: &str) -> Result<SyncJob>;

    fn get_job(&self, job_id: &str) -> Result<SyncJob>;

    fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage>;

    fn list_schedules(&self) -> Result<Vec<SyncSchedule>>;

    async fn set_schedule(
        &self,
        sync_type: SyncType,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<SyncSchedule>;

    async fn update_schedule(
        &self,
        sync_type: SyncType,
        update: ScheduleUpdate,
    ) -> Result<SyncSchedule>;

    /// Remaining call allowance of an external API.
    fn rate_budget(&self, api_name: &str) -> RateBudget;
}

/// Wires the engine components together around one job store.
pub struct SyncService {
    tracker: Arc<JobTracker>,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Arc<JobDispatcher>,
    scheduler: Arc<Scheduler>,
}

impl SyncService {
    pub fn new(
        config: &SyncEngineConfig,
        registry: SyncRegistry,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_components(
            config,
            registry,
            store,
            clock,
            Arc::new(CronScheduleEvaluator),
            Arc::new(LogProgressReporter),
        )
    }

    pub fn with_components(
        config: &SyncEngineConfig,
        registry: SyncRegistry,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        cron: Arc<dyn CronEvaluator>,
        reporter: Arc<dyn JobProgressReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let tracker = Arc::new(JobTracker::new(
            store,
            clock.clone(),
            config.error_log_capacity,
        ));
        let rate_limiter = Arc::new(RateLimiter::with_configs(&config.rate_limits));
        let executor = Arc::new(
            BatchExecutor::new(tracker.clone(), rate_limiter.clone(), config).with_reporter(reporter),
        );
        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::new(registry),
            tracker.clone(),
            executor,
        ));
        let scheduler = Arc::new(Scheduler::new(
            dispatcher.clone(),
            cron,
            clock,
            config.scheduler_tick(),
        ));

        Ok(Self {
            tracker,
            rate_limiter,
            dispatcher,
            scheduler,
        })
    }

    /// Fail jobs orphaned by a previous process, then start the scheduler.
    pub async fn start(&self) -> Result<SchedulerHandle> {
        let recovered = self.tracker.recover_interrupted().await?;
        if !recovered.is_empty() {
            info!("Recovered {} interrupted sync job(s)", recovered.len());
        }
        info!(
            "Sync engine started for: {}",
            self.dispatcher
                .registry()
                .sync_types()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(self.scheduler.clone().start())
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Wait until every dispatched run has finished.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await
    }
}

#[async_trait]
impl SyncServiceTrait for SyncService {
    async fn trigger_sync(&self, sync_type: SyncType) -> Result<SyncJob> {
        let job = self
            .dispatcher
            .dispatch(sync_type, JobTrigger::Manual)
            .await?;
        info!("Manual {} sync dispatched as job {}", sync_type, job.id);
        Ok(job)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<SyncJob> {
        self.tracker.cancel(job_id).await
    }

    fn get_job(&self, job_id: &str) -> Result<SyncJob> {
        self.tracker.get(job_id)
    }

    fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage> {
        self.tracker.list(filter)
    }

    fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        self.scheduler.list_schedules()
    }

    async fn set_schedule(
        &self,
        sync_type: SyncType,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<SyncSchedule> {
        self.scheduler
            .set_schedule(sync_type, cron_expression, enabled)
            .await
    }

    async fn update_schedule(
        &self,
        sync_type: SyncType,
        update: ScheduleUpdate,
    ) -> Result<SyncSchedule> {
        self.scheduler.update_schedule(sync_type, update).await
    }

    fn rate_budget(&self, api_name: &str) -> RateBudget {
        let api: ApiName = api_name.to_string().into();
        self.rate_limiter.budget(&api)
    }
}
