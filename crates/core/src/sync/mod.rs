//! Sync domain models: jobs, schedules, and their lifecycle rules.

mod job_model;
mod schedule_model;

pub use job_model::*;
pub use schedule_model::*;

#[cfg(test)]
mod tests;
