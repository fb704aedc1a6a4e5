//! Recurring schedules and the background tick loop.

mod cron_evaluator;
mod sync_scheduler;

pub use cron_evaluator::{CronEvaluator, CronScheduleEvaluator};
pub use sync_scheduler::{Scheduler, SchedulerHandle, TickReport};
