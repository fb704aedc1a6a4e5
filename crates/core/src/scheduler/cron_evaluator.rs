use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::errors::{Error, Result};

/// Computes occurrences of cron expressions.
pub trait CronEvaluator: Send + Sync {
    /// Reject expressions that can never be evaluated.
    fn validate(&self, expression: &str) -> Result<()>;

    /// First occurrence strictly after `after`, or `None` if the expression
    /// never fires again.
    fn next_after(&self, expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;
}

/// `CronEvaluator` backed by the `cron` crate, in UTC.
///
/// Accepts the usual 5-field form (`*/5 * * * *`) as well as the crate's
/// native 6/7-field form with seconds and optional year.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronScheduleEvaluator;

impl CronScheduleEvaluator {
    fn parse(expression: &str) -> Result<Schedule> {
        let fields = expression.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", expression.trim()),
            6 | 7 => expression.trim().to_string(),
            _ => {
                return Err(Error::InvalidCron {
                    expression: expression.to_string(),
                    reason: format!("expected 5 to 7 fields, found {}", fields),
                })
            }
        };

        Schedule::from_str(&normalized).map_err(|e| Error::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
    }
}

impl CronEvaluator for CronScheduleEvaluator {
    fn validate(&self, expression: &str) -> Result<()> {
        Self::parse(expression).map(|_| ())
    }

    fn next_after(&self, expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(Self::parse(expression)?.after(&after).next())
    }
}
