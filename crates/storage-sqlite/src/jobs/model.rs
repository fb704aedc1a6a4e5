//! Database models for sync jobs and schedules.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use storesync_core::sync::{JobStatus, JobTrigger, SyncJob, SyncSchedule, SyncType};

use crate::errors::StorageError;

/// Fixed-width UTC timestamps, so text order is chronological order.
pub(crate) fn to_db_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(table: &'static str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow {
            table,
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn parse_enum<T: FromStr>(table: &'static str, value: &str) -> Result<T, StorageError> {
    value.parse().map_err(|_| StorageError::CorruptRow {
        table,
        reason: format!("unknown value '{}'", value),
    })
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn from_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Database model for sync jobs
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::sync_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SyncJobDB {
    pub id: String,
    pub sync_type: String,
    pub trigger_kind: String,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub total_items: Option<i64>,
    pub processed_items: i64,
    pub created_count: i64,
    pub updated_count: i64,
    pub skipped_count: i64,
    pub conflict_count: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    /// JSON array of log entries
    pub error_log: String,
    pub cancel_requested: bool,
    pub updated_at: String,
}

impl TryFrom<SyncJobDB> for SyncJob {
    type Error = StorageError;

    fn try_from(db: SyncJobDB) -> Result<Self, Self::Error> {
        const TABLE: &str = "sync_jobs";

        let error_log = serde_json::from_str(&db.error_log).map_err(|e| {
            StorageError::CorruptRow {
                table: TABLE,
                reason: format!("bad error log of job {}: {}", db.id, e),
            }
        })?;

        Ok(Self {
            sync_type: parse_enum::<SyncType>(TABLE, &db.sync_type)?,
            trigger: parse_enum::<JobTrigger>(TABLE, &db.trigger_kind)?,
            status: parse_enum::<JobStatus>(TABLE, &db.status)?,
            created_at: parse_timestamp(TABLE, &db.created_at)?,
            started_at: db
                .started_at
                .as_deref()
                .map(|s| parse_timestamp(TABLE, s))
                .transpose()?,
            finished_at: db
                .finished_at
                .as_deref()
                .map(|s| parse_timestamp(TABLE, s))
                .transpose()?,
            total_items: db.total_items.map(to_count),
            processed_items: to_count(db.processed_items),
            created_count: to_count(db.created_count),
            updated_count: to_count(db.updated_count),
            skipped_count: to_count(db.skipped_count),
            conflict_count: to_count(db.conflict_count),
            error_count: to_count(db.error_count),
            last_error: db.last_error,
            error_log,
            cancel_requested: db.cancel_requested,
            updated_at: parse_timestamp(TABLE, &db.updated_at)?,
            id: db.id,
        })
    }
}

impl TryFrom<SyncJob> for SyncJobDB {
    type Error = StorageError;

    fn try_from(domain: SyncJob) -> Result<Self, Self::Error> {
        let error_log = serde_json::to_string(&domain.error_log).map_err(|e| {
            StorageError::CorruptRow {
                table: "sync_jobs",
                reason: format!("cannot encode error log of job {}: {}", domain.id, e),
            }
        })?;

        Ok(Self {
            id: domain.id,
            sync_type: domain.sync_type.as_str().to_string(),
            trigger_kind: domain.trigger.as_str().to_string(),
            status: domain.status.as_str().to_string(),
            created_at: to_db_timestamp(domain.created_at),
            started_at: domain.started_at.map(to_db_timestamp),
            finished_at: domain.finished_at.map(to_db_timestamp),
            total_items: domain.total_items.map(from_count),
            processed_items: from_count(domain.processed_items),
            created_count: from_count(domain.created_count),
            updated_count: from_count(domain.updated_count),
            skipped_count: from_count(domain.skipped_count),
            conflict_count: from_count(domain.conflict_count),
            error_count: from_count(domain.error_count),
            last_error: domain.last_error,
            error_log,
            cancel_requested: domain.cancel_requested,
            updated_at: to_db_timestamp(domain.updated_at),
        })
    }
}

/// Database model for sync schedules
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::sync_schedules)]
#[diesel(primary_key(sync_type))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct SyncScheduleDB {
    pub sync_type: String,
    pub cron_expression: String,
    pub enabled: bool,
    pub next_run_at: Option<String>,
    pub last_run_job_id: Option<String>,
    pub updated_at: String,
}

impl TryFrom<SyncScheduleDB> for SyncSchedule {
    type Error = StorageError;

    fn try_from(db: SyncScheduleDB) -> Result<Self, Self::Error> {
        const TABLE: &str = "sync_schedules";

        Ok(Self {
            sync_type: parse_enum::<SyncType>(TABLE, &db.sync_type)?,
            cron_expression: db.cron_expression,
            enabled: db.enabled,
            next_run_at: db
                .next_run_at
                .as_deref()
                .map(|s| parse_timestamp(TABLE, s))
                .transpose()?,
            last_run_job_id: db.last_run_job_id,
            updated_at: parse_timestamp(TABLE, &db.updated_at)?,
        })
    }
}

impl From<SyncSchedule> for SyncScheduleDB {
    fn from(domain: SyncSchedule) -> Self {
        Self {
            sync_type: domain.sync_type.as_str().to_string(),
            cron_expression: domain.cron_expression,
            enabled: domain.enabled,
            next_run_at: domain.next_run_at.map(to_db_timestamp),
            last_run_job_id: domain.last_run_job_id,
            updated_at: to_db_timestamp(domain.updated_at),
        }
    }
}
