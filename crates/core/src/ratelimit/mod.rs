//! Outbound call throttling for the external APIs.

mod rate_limiter;

pub use rate_limiter::{Acquire, ApiName, RateBudget, RateLimitConfig, RateLimiter};
