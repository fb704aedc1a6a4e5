use async_trait::async_trait;

use crate::connectors::{ApiError, MatchKey, TargetApi, TargetLookup, TargetRecord};
use crate::ratelimit::{ApiName, RateLimiter};

/// Target lookup that takes a rate-limit grant before every call.
///
/// Handed to the matcher so each lookup it issues, however many keys it
/// tries, is charged to the target API's budget.
pub struct RateLimitedLookup<'a> {
    target: &'a dyn TargetApi,
    limiter: &'a RateLimiter,
    api: &'a ApiName,
}

impl<'a> RateLimitedLookup<'a> {
    pub fn new(target: &'a dyn TargetApi, limiter: &'a RateLimiter, api: &'a ApiName) -> Self {
        Self {
            target,
            limiter,
            api,
        }
    }
}

#[async_trait]
impl<'a> TargetLookup for RateLimitedLookup<'a> {
    async fn lookup(&self, key: &MatchKey) -> Result<Vec<TargetRecord>, ApiError> {
        self.limiter.acquire(self.api).await;
        self.target.lookup(key).await
    }
}
