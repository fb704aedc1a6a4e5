//! Create-then-dispatch path shared by scheduled and manual triggers.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use log::{error, warn};
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::executor::BatchExecutor;
use crate::jobs::JobTracker;
use crate::registry::SyncRegistry;
use crate::sync::{JobTrigger, SyncJob, SyncType};

/// Creates jobs under the single-flight guard and runs each one on its own
/// tokio task.
pub struct JobDispatcher {
    registry: Arc<SyncRegistry>,
    tracker: Arc<JobTracker>,
    executor: Arc<BatchExecutor>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl JobDispatcher {
    pub fn new(
        registry: Arc<SyncRegistry>,
        tracker: Arc<JobTracker>,
        executor: Arc<BatchExecutor>,
    ) -> Self {
        Self {
            registry,
            tracker,
            executor,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Resolve the sync type, create its job and start it in the background.
    ///
    /// Returns the queued job without waiting for the run. Fails with
    /// `UnknownSyncType` or `AlreadyRunning` before anything is created.
    pub async fn dispatch(&self, sync_type: SyncType, trigger: JobTrigger) -> Result<SyncJob> {
        let entry = self.registry.resolve(sync_type)?;
        let job = self.tracker.create(sync_type, trigger).await?;

        let executor = self.executor.clone();
        let queued = job.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = executor.run(queued.clone(), &entry).await {
                error!(
                    "{} sync job {} could not be recorded: {}",
                    queued.sync_type, queued.id, e
                );
            }
        });

        let mut in_flight = self.lock_in_flight();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);

        Ok(job)
    }

    /// Wait for every dispatched run to finish.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = self.lock_in_flight().drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    warn!("Sync run task ended abnormally: {}", e);
                }
            }
        }
    }

    /// Number of runs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| {
            warn!("Dispatcher task list mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
