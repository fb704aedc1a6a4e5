use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::progress::{JobProgressReporter, NoOpProgressReporter};
use super::rate_limited::RateLimitedLookup;
use super::retry::retry_with_backoff;
use crate::config::{RetryPolicy, SyncEngineConfig};
use crate::connectors::{ApiError, Mutation, SourcePage, SyncRecord};
use crate::errors::{Error, Result};
use crate::jobs::JobTracker;
use crate::matching::{MatchAction, MatchResult};
use crate::ratelimit::RateLimiter;
use crate::registry::RegistryEntry;
use crate::sync::{JobLogEntry, JobLogKind, JobOutcome, ProgressDelta, SyncJob};

/// Drives one sync run from first page to terminal state.
///
/// Pages are processed sequentially. Item failures are counted and logged
/// without stopping the run; page fetches are retried with backoff and fail
/// the run only once retries are exhausted. Progress is persisted after
/// every page, so counts survive a failed or interrupted run.
pub struct BatchExecutor {
    tracker: Arc<JobTracker>,
    rate_limiter: Arc<RateLimiter>,
    reporter: Arc<dyn JobProgressReporter>,
    page_retry: RetryPolicy,
    max_pages: usize,
}

impl BatchExecutor {
    pub fn new(
        tracker: Arc<JobTracker>,
        rate_limiter: Arc<RateLimiter>,
        config: &SyncEngineConfig,
    ) -> Self {
        Self {
            tracker,
            rate_limiter,
            reporter: Arc::new(NoOpProgressReporter),
            page_retry: config.page_retry.clone(),
            max_pages: config.max_pages,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run a queued job to completion and return its terminal state.
    ///
    /// A job that was cancelled before the executor picked it up is returned
    /// unchanged. `Err` is only returned when the tracker itself cannot
    /// record the outcome.
    pub async fn run(&self, job: SyncJob, entry: &RegistryEntry) -> Result<SyncJob> {
        let job = match self
            .retry_tracker_write(&job.id, || self.tracker.start(&job.id))
            .await
        {
            Ok(job) => job,
            Err(Error::InvalidTransition { from, .. }) if from.is_terminal() => {
                info!(
                    "{} sync job {} is already {}, not running it",
                    job.sync_type, job.id, from
                );
                return self.tracker.get(&job.id);
            }
            Err(e) => return Err(e),
        };
        self.reporter.job_started(&job);

        let outcome = match self.drive(&job, entry).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{} sync job {} aborted: {}", job.sync_type, job.id, e);
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let finished = self.record_outcome(&job, outcome).await?;
        self.reporter.job_finished(&finished);
        Ok(finished)
    }

    /// Persist the terminal outcome. When the store keeps refusing it, the
    /// job is failed instead so it never holds its sync type's slot.
    async fn record_outcome(&self, job: &SyncJob, outcome: JobOutcome) -> Result<SyncJob> {
        let err = match self
            .retry_tracker_write(&job.id, || self.tracker.complete(&job.id, outcome.clone()))
            .await
        {
            Ok(finished) => return Ok(finished),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        error!(
            "{} sync job {}: {} outcome could not be recorded: {}",
            job.sync_type,
            job.id,
            outcome.status(),
            err
        );
        let fallback = JobOutcome::Failed {
            error: format!("outcome could not be recorded: {}", err),
        };
        self.retry_tracker_write(&job.id, || self.tracker.complete(&job.id, fallback.clone()))
            .await
    }

    /// Retry a tracker write on transient storage errors, backing off as for
    /// page fetches.
    async fn retry_tracker_write<T, Op, Fut>(&self, job_id: &str, mut op: Op) -> Result<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.page_retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_transient() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.page_retry.backoff(attempt);
            warn!(
                "Recording sync job {} failed (attempt {}/{}): {}; retrying in {:?}",
                job_id, attempt, max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn drive(&self, job: &SyncJob, entry: &RegistryEntry) -> Result<JobOutcome> {
        if entry.sync_type != job.sync_type {
            return Ok(JobOutcome::Failed {
                error: format!(
                    "registry entry for {} cannot run a {} job",
                    entry.sync_type, job.sync_type
                ),
            });
        }

        let mut page_token: Option<String> = None;
        let mut pages_done = 0usize;

        loop {
            if self.tracker.is_cancel_requested(&job.id) {
                return Ok(JobOutcome::Cancelled);
            }
            if pages_done >= self.max_pages {
                return Ok(JobOutcome::Failed {
                    error: format!("source exceeded the limit of {} pages", self.max_pages),
                });
            }

            let mut delta = ProgressDelta::default();
            let page = match self
                .fetch_page(entry, page_token.as_deref(), &mut delta.log)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    // Keep the page errors on the job before failing it.
                    self.tracker.update_progress(&job.id, delta).await?;
                    return Ok(JobOutcome::Failed {
                        error: format!("page {} could not be fetched: {}", pages_done + 1, e),
                    });
                }
            };
            pages_done += 1;
            delta.total_items = page.total;

            let SourcePage {
                records,
                next_page_token,
                ..
            } = page;

            let mut cancelled = false;
            for record in &records {
                if self.tracker.is_cancel_requested(&job.id) {
                    cancelled = true;
                    break;
                }
                self.process_record(job, entry, record, &mut delta).await;
            }

            let snapshot = self.tracker.update_progress(&job.id, delta).await?;
            self.reporter.page_processed(&snapshot, pages_done);
            debug!(
                "{} sync job {}: page {} persisted ({} records)",
                job.sync_type,
                job.id,
                pages_done,
                records.len()
            );

            if cancelled {
                return Ok(JobOutcome::Cancelled);
            }

            match next_page_token {
                None => return Ok(JobOutcome::Succeeded),
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    return Ok(JobOutcome::Failed {
                        error: format!(
                            "source returned page token '{}' twice; pagination is stuck",
                            next
                        ),
                    });
                }
                Some(next) => page_token = Some(next),
            }
        }
    }

    /// Fetch one page, retrying transient failures. Every failed attempt is
    /// appended to `page_log`.
    async fn fetch_page(
        &self,
        entry: &RegistryEntry,
        page_token: Option<&str>,
        page_log: &mut Vec<JobLogEntry>,
    ) -> std::result::Result<SourcePage, ApiError> {
        let limiter = self.rate_limiter.as_ref();
        let source = entry.source.as_ref();
        let api = &entry.source_api;
        let sync_type = entry.sync_type;
        let page_size = entry.page_size;
        let max_attempts = self.page_retry.max_attempts;
        let tracker = self.tracker.as_ref();

        retry_with_backoff(
            &self.page_retry,
            move |_| async move {
                limiter.acquire(api).await;
                source.fetch_page(sync_type, page_token, page_size).await
            },
            |attempt, err| {
                page_log.push(JobLogEntry::new(
                    tracker.now(),
                    JobLogKind::PageError,
                    None,
                    format!(
                        "page fetch attempt {}/{} failed: {}",
                        attempt, max_attempts, err
                    ),
                ));
            },
        )
        .await
    }

    async fn process_record(
        &self,
        job: &SyncJob,
        entry: &RegistryEntry,
        record: &SyncRecord,
        delta: &mut ProgressDelta,
    ) {
        delta.processed += 1;

        match self.apply_record(entry, record).await {
            Ok(result) => match result.action {
                MatchAction::Create => delta.created += 1,
                MatchAction::Update => delta.updated += 1,
                MatchAction::Skip => delta.skipped += 1,
                MatchAction::Conflict => {
                    delta.skipped += 1;
                    delta.conflicts += 1;
                    let reason = result
                        .reason
                        .unwrap_or_else(|| "ambiguous match".to_string());
                    debug!(
                        "{} sync job {}: record {} left untouched: {}",
                        job.sync_type, job.id, record.id, reason
                    );
                    delta.log.push(JobLogEntry::new(
                        self.tracker.now(),
                        JobLogKind::Conflict,
                        Some(record.id.clone()),
                        reason,
                    ));
                }
            },
            Err(e) => {
                warn!(
                    "{} sync job {}: record {} failed: {}",
                    job.sync_type, job.id, record.id, e
                );
                delta.errors += 1;
                delta.log.push(JobLogEntry::new(
                    self.tracker.now(),
                    JobLogKind::ItemError,
                    Some(record.id.clone()),
                    e.to_string(),
                ));
            }
        }
    }

    /// Match one record and apply the resulting mutation.
    async fn apply_record(
        &self,
        entry: &RegistryEntry,
        record: &SyncRecord,
    ) -> std::result::Result<MatchResult, ApiError> {
        let lookup = RateLimitedLookup::new(
            entry.target.as_ref(),
            self.rate_limiter.as_ref(),
            &entry.target_api,
        );
        let result = entry.matcher.match_record(record, &lookup).await?;

        let mutation = match result.action {
            MatchAction::Create => Mutation::Create(record),
            MatchAction::Update => match result.target_id.as_deref() {
                Some(target_id) => Mutation::Update { target_id, record },
                None => {
                    return Err(ApiError::InvalidRecord(format!(
                        "update of {} has no target record",
                        record.id
                    )))
                }
            },
            MatchAction::Skip | MatchAction::Conflict => return Ok(result),
        };

        self.rate_limiter.acquire(&entry.target_api).await;
        entry.target.mutate(mutation).await?;
        Ok(result)
    }
}
