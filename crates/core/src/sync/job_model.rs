//! Sync job domain models.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// The fixed set of data categories synchronized from Nhanh.vn to Shopify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Customers,
    Products,
    Campaigns,
    Loyalty,
}

impl SyncType {
    pub const ALL: [SyncType; 4] = [
        SyncType::Customers,
        SyncType::Products,
        SyncType::Campaigns,
        SyncType::Loyalty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Customers => "customers",
            SyncType::Products => "products",
            SyncType::Campaigns => "campaigns",
            SyncType::Loyalty => "loyalty",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customers" => Ok(SyncType::Customers),
            "products" => Ok(SyncType::Products),
            "campaigns" => Ok(SyncType::Campaigns),
            "loyalty" => Ok(SyncType::Loyalty),
            _ => Err(Error::UnknownSyncType(s.to_string())),
        }
    }
}

/// Lifecycle status of a sync job.
///
/// Transitions are monotonic: `queued -> running -> {succeeded, failed, cancelled}`.
/// A queued job may also be cancelled (or failed by restart recovery) before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Queued or running jobs hold the single-flight slot of their sync type.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued, JobStatus::Cancelled | JobStatus::Failed) => true,
            (JobStatus::Running, s) => s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(Error::Validation(format!("unknown job status '{}'", other))),
        }
    }
}

/// What started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Scheduled,
    #[default]
    Manual,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobTrigger::Scheduled => "scheduled",
            JobTrigger::Manual => "manual",
        }
    }
}

impl FromStr for JobTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobTrigger::Scheduled),
            "manual" => Ok(JobTrigger::Manual),
            other => Err(Error::Validation(format!("unknown job trigger '{}'", other))),
        }
    }
}

/// Kind of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLogKind {
    /// A single record failed; the run continued.
    ItemError,
    /// A record matched several target candidates and was left untouched.
    Conflict,
    /// A page fetch failed (possibly retried).
    PageError,
}

/// One entry of a job's capped error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub at: DateTime<Utc>,
    pub kind: JobLogKind,
    pub source_id: Option<String>,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(
        at: DateTime<Utc>,
        kind: JobLogKind,
        source_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            at,
            kind,
            source_id,
            message: message.into(),
        }
    }
}

/// Counters accumulated by the batch executor between two progress flushes.
///
/// All counters are additive; applying a delta never decreases a job's totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDelta {
    /// Total item count reported by the source, if known.
    pub total_items: Option<u64>,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    /// Skipped items, conflicts included.
    pub skipped: u64,
    /// Subset of `skipped` caused by ambiguous matches.
    pub conflicts: u64,
    pub errors: u64,
    pub log: Vec<JobLogEntry>,
}

impl ProgressDelta {
    pub fn is_empty(&self) -> bool {
        self.total_items.is_none() && self.processed == 0 && self.log.is_empty()
    }
}

/// Terminal outcome handed to the job tracker when a run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed { error: String },
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded => JobStatus::Succeeded,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// One execution of one sync type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    /// Time-ordered unique identifier (UUIDv7)
    pub id: String,
    pub sync_type: SyncType,
    pub trigger: JobTrigger,
    pub status: JobStatus,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// When the executor picked the job up
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff the status is terminal
    pub finished_at: Option<DateTime<Utc>>,
    pub total_items: Option<u64>,
    pub processed_items: u64,
    pub created_count: u64,
    pub updated_count: u64,
    pub skipped_count: u64,
    pub conflict_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    /// Oldest entries first, bounded by the configured capacity
    pub error_log: VecDeque<JobLogEntry>,
    pub cancel_requested: bool,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    /// Create a new queued job
    pub fn new(sync_type: SyncType, trigger: JobTrigger, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            sync_type,
            trigger,
            status: JobStatus::Queued,
            created_at: now,
            started_at: None,
            finished_at: None,
            total_items: None,
            processed_items: 0,
            created_count: 0,
            updated_count: 0,
            skipped_count: 0,
            conflict_count: 0,
            error_count: 0,
            last_error: None,
            error_log: VecDeque::new(),
            cancel_requested: false,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the job as picked up by the executor
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Add a progress delta, evicting the oldest log entries beyond `log_capacity`.
    pub fn apply_progress(&mut self, delta: ProgressDelta, log_capacity: usize, now: DateTime<Utc>) {
        self.processed_items += delta.processed;
        self.created_count += delta.created;
        self.updated_count += delta.updated;
        self.skipped_count += delta.skipped;
        self.conflict_count += delta.conflicts;
        self.error_count += delta.errors;

        if let Some(total) = delta.total_items {
            self.total_items = Some(total);
        }
        // The source may grow while we page through it.
        if let Some(total) = self.total_items {
            if self.processed_items > total {
                self.total_items = Some(self.processed_items);
            }
        }

        for entry in delta.log {
            if entry.kind != JobLogKind::Conflict {
                self.last_error = Some(entry.message.clone());
            }
            self.error_log.push_back(entry);
        }
        while self.error_log.len() > log_capacity {
            self.error_log.pop_front();
        }
        self.updated_at = now;
    }

    /// Move the job to its terminal state
    pub fn finish(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> Result<(), Error> {
        self.transition(outcome.status())?;
        if let JobOutcome::Failed { error } = outcome {
            self.last_error = Some(error);
        }
        if self.total_items.is_none() && self.status == JobStatus::Succeeded {
            self.total_items = Some(self.processed_items);
        }
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Sum of per-outcome counters; equals `processed_items` for every job.
    pub fn accounted_items(&self) -> u64 {
        self.created_count + self.updated_count + self.skipped_count + self.error_count
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Query filter for job listings. All criteria are optional and combined with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    pub sync_type: Option<SyncType>,
    pub status: Option<JobStatus>,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_to: Option<DateTime<Utc>>,
    pub offset: usize,
    /// `None` returns every remaining match
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn for_sync_type(sync_type: SyncType) -> Self {
        Self {
            sync_type: Some(sync_type),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether a job satisfies every criterion except pagination.
    pub fn matches(&self, job: &SyncJob) -> bool {
        self.sync_type.map_or(true, |t| job.sync_type == t)
            && self.status.map_or(true, |s| job.status == s)
            && self.created_from.map_or(true, |from| job.created_at >= from)
            && self.created_to.map_or(true, |to| job.created_at < to)
    }
}

/// A page of jobs, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<SyncJob>,
    /// Number of jobs matching the filter, ignoring pagination
    pub total: usize,
}
