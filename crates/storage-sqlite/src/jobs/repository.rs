//! SQLite implementation of the engine's job store.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::debug;

use storesync_core::errors::{Error, Result};
use storesync_core::jobs::JobStore;
use storesync_core::sync::{JobFilter, JobPage, JobStatus, SyncJob, SyncSchedule, SyncType};

use super::model::{to_db_timestamp, SyncJobDB, SyncScheduleDB};
use crate::db::{get_connection, init, spawn_writer, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sync_jobs, sync_schedules};

fn active_statuses() -> Vec<&'static str> {
    vec![JobStatus::Queued.as_str(), JobStatus::Running.as_str()]
}

/// Jobs matching every criterion of `filter`, pagination excluded.
fn filtered_jobs(filter: &JobFilter) -> sync_jobs::BoxedQuery<'static, Sqlite> {
    let mut query = sync_jobs::table.into_boxed();
    if let Some(sync_type) = filter.sync_type {
        query = query.filter(sync_jobs::sync_type.eq(sync_type.as_str()));
    }
    if let Some(status) = filter.status {
        query = query.filter(sync_jobs::status.eq(status.as_str()));
    }
    if let Some(from) = filter.created_from {
        query = query.filter(sync_jobs::created_at.ge(to_db_timestamp(from)));
    }
    if let Some(to) = filter.created_to {
        query = query.filter(sync_jobs::created_at.lt(to_db_timestamp(to)));
    }
    query
}

fn is_single_flight_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
            if info.message().contains("sync_jobs.sync_type")
    )
}

/// Job store backed by SQLite.
///
/// Reads use the pool; every write goes through the single writer actor in an
/// immediate transaction, which makes check-then-insert atomic. The partial
/// unique index on active jobs backs the same guarantee at the schema level.
pub struct SqliteJobStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteJobStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Open (and migrate) the database at `db_path` and start its writer.
    /// Must be called within a tokio runtime.
    pub fn open(db_path: &str) -> Result<Self> {
        let pool = init(db_path)?;
        let writer = spawn_writer((*pool).clone());
        Ok(Self::new(pool, writer))
    }

    fn load_jobs(&self, query: sync_jobs::BoxedQuery<'static, Sqlite>) -> Result<Vec<SyncJob>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = query
            .select(SyncJobDB::as_select())
            .load::<SyncJobDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| SyncJob::try_from(row).map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job_if_idle(&self, job: SyncJob) -> Result<SyncJob> {
        let sync_type = job.sync_type;
        let row = SyncJobDB::try_from(job)?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncJob> {
                let busy: i64 = sync_jobs::table
                    .filter(sync_jobs::sync_type.eq(&row.sync_type))
                    .filter(sync_jobs::status.eq_any(active_statuses()))
                    .count()
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                if busy > 0 {
                    return Err(Error::AlreadyRunning { sync_type });
                }

                diesel::insert_into(sync_jobs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| {
                        if is_single_flight_violation(&e) {
                            Error::AlreadyRunning { sync_type }
                        } else {
                            StorageError::from(e).into()
                        }
                    })?;

                debug!("Inserted {} sync job {}", row.sync_type, row.id);
                Ok(SyncJob::try_from(row)?)
            })
            .await
    }

    async fn update_job(&self, job: SyncJob) -> Result<SyncJob> {
        let row = SyncJobDB::try_from(job)?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncJob> {
                let updated = diesel::update(sync_jobs::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(Error::JobNotFound(row.id));
                }
                Ok(SyncJob::try_from(row)?)
            })
            .await
    }

    fn get_job(&self, job_id: &str) -> Result<SyncJob> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_jobs::table
            .find(job_id)
            .select(SyncJobDB::as_select())
            .first::<SyncJobDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        Ok(SyncJob::try_from(row)?)
    }

    fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage> {
        let total: i64 = {
            let mut conn = get_connection(&self.pool)?;
            filtered_jobs(filter)
                .count()
                .get_result(&mut conn)
                .map_err(StorageError::from)?
        };

        let mut query = filtered_jobs(filter)
            .order((sync_jobs::created_at.desc(), sync_jobs::id.desc()));
        if let Some(limit) = filter.limit {
            query = query.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if filter.offset > 0 {
            query = query.offset(i64::try_from(filter.offset).unwrap_or(i64::MAX));
        }

        Ok(JobPage {
            jobs: self.load_jobs(query)?,
            total: total.max(0) as usize,
        })
    }

    fn list_active_jobs(&self) -> Result<Vec<SyncJob>> {
        let query = sync_jobs::table
            .into_boxed()
            .filter(sync_jobs::status.eq_any(active_statuses()))
            .order((sync_jobs::created_at.desc(), sync_jobs::id.desc()));
        self.load_jobs(query)
    }

    async fn save_schedule(&self, schedule: SyncSchedule) -> Result<SyncSchedule> {
        let row = SyncScheduleDB::from(schedule.clone());

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncSchedule> {
                diesel::insert_into(sync_schedules::table)
                    .values(&row)
                    .on_conflict(sync_schedules::sync_type)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(schedule)
            })
            .await
    }

    fn get_schedule(&self, sync_type: SyncType) -> Result<Option<SyncSchedule>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_schedules::table
            .find(sync_type.as_str())
            .select(SyncScheduleDB::as_select())
            .first::<SyncScheduleDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(SyncSchedule::try_from).transpose()?)
    }

    fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_schedules::table
            .select(SyncScheduleDB::as_select())
            .load::<SyncScheduleDB>(&mut conn)
            .map_err(StorageError::from)?;

        let mut schedules = rows
            .into_iter()
            .map(|row| SyncSchedule::try_from(row).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        schedules.sort_by_key(|s| s.sync_type);
        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use diesel::RunQueryDsl;
    use storesync_core::clock::ManualClock;
    use storesync_core::jobs::JobTracker;
    use storesync_core::sync::{
        JobLogEntry, JobLogKind, JobOutcome, JobTrigger, ProgressDelta,
    };
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap()
    }

    /// Creates a store on a temp database. Keep the temp dir alive for the test.
    fn create_test_store() -> (Arc<SqliteJobStore>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("storesync.db");
        let store = SqliteJobStore::open(&db_path.to_string_lossy()).expect("Failed to open store");
        (Arc::new(store), temp_dir)
    }

    fn job_at(sync_type: SyncType, at: DateTime<Utc>) -> SyncJob {
        SyncJob::new(sync_type, JobTrigger::Manual, at)
    }

    fn finished(mut job: SyncJob, at: DateTime<Utc>) -> SyncJob {
        job.start(at).unwrap();
        job.finish(JobOutcome::Succeeded, at).unwrap();
        job
    }

    #[tokio::test]
    async fn test_job_round_trips_every_field() {
        let (store, _dir) = create_test_store();
        let job = store
            .create_job_if_idle(job_at(SyncType::Customers, t0()))
            .await
            .unwrap();

        let mut running = job.clone();
        running.start(t0() + Duration::seconds(1)).unwrap();
        running.apply_progress(
            ProgressDelta {
                total_items: Some(120),
                processed: 50,
                created: 45,
                skipped: 3,
                conflicts: 1,
                errors: 2,
                log: vec![JobLogEntry::new(
                    t0(),
                    JobLogKind::ItemError,
                    Some("nh-27".to_string()),
                    "422 Unprocessable Entity",
                )],
                ..Default::default()
            },
            100,
            t0() + Duration::seconds(2),
        );
        store.update_job(running.clone()).await.unwrap();

        let loaded = store.get_job(&job.id).unwrap();
        assert_eq!(loaded, running);
        assert_eq!(loaded.error_log.len(), 1);
        assert_eq!(loaded.last_error.as_deref(), Some("422 Unprocessable Entity"));
    }

    #[tokio::test]
    async fn test_second_active_job_is_rejected() {
        let (store, _dir) = create_test_store();
        let first = store
            .create_job_if_idle(job_at(SyncType::Products, t0()))
            .await
            .unwrap();

        let err = store
            .create_job_if_idle(job_at(SyncType::Products, t0()))
            .await
            .unwrap_err();
        assert!(err.is_already_running());

        // Another sync type is unaffected.
        store
            .create_job_if_idle(job_at(SyncType::Customers, t0()))
            .await
            .unwrap();

        store.update_job(finished(first, t0())).await.unwrap();
        store
            .create_job_if_idle(job_at(SyncType::Products, t0()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_index_rejects_raw_second_active_row() {
        let (store, _dir) = create_test_store();
        store
            .create_job_if_idle(job_at(SyncType::Loyalty, t0()))
            .await
            .unwrap();

        let mut conn = get_connection(&store.pool).unwrap();
        let result = diesel::sql_query(
            "INSERT INTO sync_jobs (id, sync_type, trigger_kind, status, created_at, updated_at) \
             VALUES ('raw-1', 'loyalty', 'manual', 'running', '2026-10-01T08:00:00.000000Z', '2026-10-01T08:00:00.000000Z')",
        )
        .execute(&mut conn);
        assert!(matches!(result, Err(ref e) if is_single_flight_violation(e)));
    }

    #[tokio::test]
    async fn test_missing_jobs() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.get_job("missing").unwrap_err(),
            Error::JobNotFound(_)
        ));
        assert!(matches!(
            store
                .update_job(job_at(SyncType::Customers, t0()))
                .await
                .unwrap_err(),
            Error::JobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_filters_and_pages_newest_first() {
        let (store, _dir) = create_test_store();
        let mut ids = Vec::new();
        for i in 0..5 {
            let at = t0() + Duration::minutes(i);
            let job = store
                .create_job_if_idle(job_at(SyncType::Customers, at))
                .await
                .unwrap();
            ids.push(job.id.clone());
            store.update_job(finished(job, at)).await.unwrap();
        }
        store
            .create_job_if_idle(job_at(SyncType::Products, t0()))
            .await
            .unwrap();

        let all = store.list_jobs(&JobFilter::default()).unwrap();
        assert_eq!(all.total, 6);

        let page = store
            .list_jobs(&JobFilter::for_sync_type(SyncType::Customers).with_page(1, 2))
            .unwrap();
        assert_eq!(page.total, 5);
        let page_ids: Vec<&str> = page.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(page_ids, vec![ids[3].as_str(), ids[2].as_str()]);

        let queued = store
            .list_jobs(&JobFilter::default().with_status(JobStatus::Queued))
            .unwrap();
        assert_eq!(queued.total, 1);
        assert_eq!(queued.jobs[0].sync_type, SyncType::Products);

        let window = JobFilter {
            sync_type: Some(SyncType::Customers),
            created_from: Some(t0() + Duration::minutes(1)),
            created_to: Some(t0() + Duration::minutes(3)),
            ..Default::default()
        };
        let in_window = store.list_jobs(&window).unwrap();
        assert_eq!(in_window.total, 2);
        assert_eq!(in_window.jobs[0].id, ids[2]);
        assert_eq!(in_window.jobs[1].id, ids[1]);

        let active = store.list_active_jobs().unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_schedules_are_keyed_by_sync_type() {
        let (store, _dir) = create_test_store();
        assert!(store.get_schedule(SyncType::Products).unwrap().is_none());

        let mut schedule = SyncSchedule::new(SyncType::Products, "0 * * * *", true, t0());
        schedule.next_run_at = Some(t0() + Duration::hours(1));
        store.save_schedule(schedule.clone()).await.unwrap();

        let mut replaced = schedule.clone();
        replaced.cron_expression = "*/5 * * * *".to_string();
        replaced.next_run_at = None;
        replaced.enabled = false;
        store.save_schedule(replaced.clone()).await.unwrap();
        store
            .save_schedule(SyncSchedule::new(SyncType::Customers, "0 2 * * *", true, t0()))
            .await
            .unwrap();

        assert_eq!(
            store.get_schedule(SyncType::Products).unwrap(),
            Some(replaced)
        );
        let types: Vec<SyncType> = store
            .list_schedules()
            .unwrap()
            .into_iter()
            .map(|s| s.sync_type)
            .collect();
        assert_eq!(types, vec![SyncType::Customers, SyncType::Products]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_through_tracker_admit_one() {
        let (store, _dir) = create_test_store();
        let tracker = Arc::new(JobTracker::new(
            store.clone(),
            Arc::new(ManualClock::new(t0())),
            100,
        ));

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker.create(SyncType::Campaigns, JobTrigger::Manual).await
                })
            })
            .collect();

        let mut admitted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => assert!(err.is_already_running()),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(
            store
                .list_jobs(&JobFilter::for_sync_type(SyncType::Campaigns))
                .unwrap()
                .total,
            1
        );
    }

    #[tokio::test]
    async fn test_restart_recovery_on_reopened_database() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("storesync.db");
        let db_path = db_path.to_string_lossy().to_string();

        let orphan_id = {
            let store = SqliteJobStore::open(&db_path).unwrap();
            let mut job = store
                .create_job_if_idle(job_at(SyncType::Customers, t0()))
                .await
                .unwrap();
            job.start(t0()).unwrap();
            store.update_job(job.clone()).await.unwrap();
            job.id
        };

        let store: Arc<SqliteJobStore> = Arc::new(SqliteJobStore::open(&db_path).unwrap());
        let tracker = JobTracker::new(store.clone(), Arc::new(ManualClock::new(t0())), 100);
        let recovered = tracker.recover_interrupted().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, orphan_id);
        assert_eq!(store.get_job(&orphan_id).unwrap().status, JobStatus::Failed);

        tracker
            .create(SyncType::Customers, JobTrigger::Scheduled)
            .await
            .unwrap();
    }
}
