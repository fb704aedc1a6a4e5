//! Batch execution of sync runs.

mod batch_executor;
mod progress;
mod rate_limited;
mod retry;

pub use batch_executor::BatchExecutor;
pub use progress::{
    JobProgressReporter, LogProgressReporter, MockProgressReporter, NoOpProgressReporter,
    ProgressEvent,
};
pub use rate_limited::RateLimitedLookup;
pub use retry::retry_with_backoff;
