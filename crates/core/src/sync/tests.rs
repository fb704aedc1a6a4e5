//! Tests for sync domain models.

use super::*;
use chrono::{Duration, TimeZone, Utc};

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap()
}

// ============================================================================
// SyncType Tests
// ============================================================================

mod sync_type_tests {
    use super::*;

    #[test]
    fn test_sync_type_parse_and_display() {
        for sync_type in SyncType::ALL {
            let parsed: SyncType = sync_type.as_str().parse().unwrap();
            assert_eq!(parsed, sync_type);
            assert_eq!(sync_type.to_string(), sync_type.as_str());
        }
        assert_eq!(" Products ".parse::<SyncType>().unwrap(), SyncType::Products);
    }

    #[test]
    fn test_unknown_sync_type() {
        let err = "orders".parse::<SyncType>().unwrap_err();
        assert!(matches!(err, crate::Error::UnknownSyncType(ref s) if s == "orders"));
    }

    #[test]
    fn test_sync_type_serialization() {
        let json = serde_json::to_string(&SyncType::Loyalty).unwrap();
        assert_eq!(json, "\"loyalty\"");
    }
}

// ============================================================================
// JobStatus Tests
// ============================================================================

mod job_status_tests {
    use super::*;

    #[test]
    fn test_active_and_terminal() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Succeeded));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }
}

// ============================================================================
// SyncJob Tests
// ============================================================================

mod sync_job_tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued() {
        let job = SyncJob::new(SyncType::Customers, JobTrigger::Manual, t0());

        assert!(!job.id.is_empty());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.created_at, t0());
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
        assert!(job.total_items.is_none());
        assert_eq!(job.accounted_items(), 0);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut job = SyncJob::new(SyncType::Products, JobTrigger::Scheduled, t0());
        job.start(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.finished_at.is_none());

        job.apply_progress(
            ProgressDelta {
                total_items: Some(10),
                processed: 10,
                created: 4,
                updated: 3,
                skipped: 2,
                errors: 1,
                ..Default::default()
            },
            10,
            t0(),
        );
        job.finish(JobOutcome::Succeeded, t0() + Duration::seconds(31))
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.finished_at, Some(t0() + Duration::seconds(31)));
        assert_eq!(job.duration(), Some(Duration::seconds(30)));
        assert_eq!(job.processed_items, job.accounted_items());
    }

    #[test]
    fn test_finish_twice_is_rejected() {
        let mut job = SyncJob::new(SyncType::Loyalty, JobTrigger::Manual, t0());
        job.start(t0()).unwrap();
        job.finish(JobOutcome::Cancelled, t0()).unwrap();

        let err = job
            .finish(
                JobOutcome::Failed {
                    error: "late".to_string(),
                },
                t0(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::InvalidTransition {
                from: JobStatus::Cancelled,
                to: JobStatus::Failed,
                ..
            }
        ));
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_failed_outcome_sets_last_error_and_keeps_counts() {
        let mut job = SyncJob::new(SyncType::Customers, JobTrigger::Manual, t0());
        job.start(t0()).unwrap();
        job.apply_progress(
            ProgressDelta {
                processed: 25,
                created: 25,
                ..Default::default()
            },
            10,
            t0(),
        );
        job.finish(
            JobOutcome::Failed {
                error: "page 2 unavailable".to_string(),
            },
            t0(),
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.created_count, 25);
        assert_eq!(job.last_error.as_deref(), Some("page 2 unavailable"));
        assert!(job.total_items.is_none());
    }

    #[test]
    fn test_error_log_evicts_oldest() {
        let mut job = SyncJob::new(SyncType::Customers, JobTrigger::Manual, t0());
        job.start(t0()).unwrap();

        let log: Vec<JobLogEntry> = (0..5)
            .map(|i| {
                JobLogEntry::new(
                    t0(),
                    JobLogKind::ItemError,
                    Some(format!("src-{}", i)),
                    format!("failure {}", i),
                )
            })
            .collect();
        job.apply_progress(
            ProgressDelta {
                processed: 5,
                errors: 5,
                log,
                ..Default::default()
            },
            3,
            t0(),
        );

        assert_eq!(job.error_log.len(), 3);
        assert_eq!(job.error_log.front().unwrap().message, "failure 2");
        assert_eq!(job.error_log.back().unwrap().message, "failure 4");
        assert_eq!(job.last_error.as_deref(), Some("failure 4"));
    }

    #[test]
    fn test_conflicts_do_not_overwrite_last_error() {
        let mut job = SyncJob::new(SyncType::Products, JobTrigger::Manual, t0());
        job.start(t0()).unwrap();
        job.apply_progress(
            ProgressDelta {
                processed: 2,
                errors: 1,
                skipped: 1,
                conflicts: 1,
                log: vec![
                    JobLogEntry::new(t0(), JobLogKind::ItemError, None, "timeout"),
                    JobLogEntry::new(t0(), JobLogKind::Conflict, None, "2 candidates"),
                ],
                ..Default::default()
            },
            10,
            t0(),
        );
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
        assert_eq!(job.error_log.len(), 2);
    }

    #[test]
    fn test_total_grows_with_source() {
        let mut job = SyncJob::new(SyncType::Products, JobTrigger::Manual, t0());
        job.start(t0()).unwrap();
        job.apply_progress(
            ProgressDelta {
                total_items: Some(3),
                processed: 4,
                created: 4,
                ..Default::default()
            },
            10,
            t0(),
        );
        assert_eq!(job.total_items, Some(4));
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = SyncJob::new(SyncType::Campaigns, JobTrigger::Scheduled, t0());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["syncType"], "campaigns");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["trigger"], "scheduled");
        assert!(json["finishedAt"].is_null());
    }
}

// ============================================================================
// JobFilter Tests
// ============================================================================

mod job_filter_tests {
    use super::*;

    #[test]
    fn test_filter_matches_all_criteria() {
        let job = SyncJob::new(SyncType::Customers, JobTrigger::Manual, t0());

        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::for_sync_type(SyncType::Customers).matches(&job));
        assert!(!JobFilter::for_sync_type(SyncType::Products).matches(&job));
        assert!(!JobFilter::for_sync_type(SyncType::Customers)
            .with_status(JobStatus::Running)
            .matches(&job));

        let window = JobFilter {
            created_from: Some(t0()),
            created_to: Some(t0() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(window.matches(&job));

        let before = JobFilter {
            created_to: Some(t0()),
            ..Default::default()
        };
        assert!(!before.matches(&job));
    }
}

// ============================================================================
// SyncSchedule Tests
// ============================================================================

mod schedule_tests {
    use super::*;

    #[test]
    fn test_schedule_is_due() {
        let mut schedule = SyncSchedule::new(SyncType::Products, "*/5 * * * *", true, t0());
        assert!(!schedule.is_due(t0()));

        schedule.next_run_at = Some(t0());
        assert!(schedule.is_due(t0()));
        assert!(!schedule.is_due(t0() - Duration::seconds(1)));

        schedule.enabled = false;
        assert!(!schedule.is_due(t0()));
    }
}
