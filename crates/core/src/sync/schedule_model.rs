//! Recurring schedule domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncType;

/// Recurring cadence for one sync type. Stored keyed by sync type, so a type
/// has at most one schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSchedule {
    pub sync_type: SyncType,
    pub cron_expression: String,
    pub enabled: bool,
    /// Derived from the cron expression; `None` until first evaluated
    pub next_run_at: Option<DateTime<Utc>>,
    /// Job started by the most recent due tick (lookup only)
    pub last_run_job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncSchedule {
    pub fn new(
        sync_type: SyncType,
        cron_expression: impl Into<String>,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sync_type,
            cron_expression: cron_expression.into(),
            enabled,
            next_run_at: None,
            last_run_job_id: None,
            updated_at: now,
        }
    }

    /// Whether the scheduler should fire this schedule at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|next| next <= now)
    }
}

/// Partial update of a schedule. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
}
