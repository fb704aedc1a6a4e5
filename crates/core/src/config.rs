//! Engine configuration.
//!
//! Defaults suit a single Nhanh.vn shop syncing into one Shopify store. Every
//! value can be overridden from the environment (`STORESYNC_*`), with a `.env`
//! file loaded best-effort first.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::ratelimit::RateLimitConfig;

/// API name used for Nhanh.vn calls.
pub const NHANH_API: &str = "nhanh";
/// API name used for Shopify calls.
pub const SHOPIFY_API: &str = "shopify";

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_PAGES: usize = 10_000;
const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;
const DEFAULT_SCHEDULER_TICK_SECS: u64 = 60;

pub const ENV_PAGE_SIZE: &str = "STORESYNC_PAGE_SIZE";
pub const ENV_MAX_PAGES: &str = "STORESYNC_MAX_PAGES";
pub const ENV_PAGE_RETRY_ATTEMPTS: &str = "STORESYNC_PAGE_RETRY_ATTEMPTS";
pub const ENV_PAGE_RETRY_BACKOFF_MS: &str = "STORESYNC_PAGE_RETRY_BACKOFF_MS";
pub const ENV_ERROR_LOG_CAPACITY: &str = "STORESYNC_ERROR_LOG_CAPACITY";
pub const ENV_SCHEDULER_TICK_SECS: &str = "STORESYNC_SCHEDULER_TICK_SECS";

/// Exponential backoff for page-level retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = delay.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Settings shared by the executor, the job tracker and the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncEngineConfig {
    /// Records requested per source page.
    pub page_size: usize,
    /// Upper bound on pages per run.
    pub max_pages: usize,
    pub page_retry: RetryPolicy,
    /// Entries kept in a job's error log.
    pub error_log_capacity: usize,
    pub scheduler_tick_secs: u64,
    /// Per-API limits keyed by API name.
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert(NHANH_API.to_string(), RateLimitConfig::new(150, 30_000));
        rate_limits.insert(SHOPIFY_API.to_string(), RateLimitConfig::new(40, 20_000));

        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            page_retry: RetryPolicy::default(),
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            scheduler_tick_secs: DEFAULT_SCHEDULER_TICK_SECS,
            rate_limits,
        }
    }
}

impl SyncEngineConfig {
    /// Defaults overridden by `STORESYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_PAGE_SIZE)? {
            config.page_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_PAGES)? {
            config.max_pages = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PAGE_RETRY_ATTEMPTS)? {
            config.page_retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PAGE_RETRY_BACKOFF_MS)? {
            config.page_retry.initial_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_ERROR_LOG_CAPACITY)? {
            config.error_log_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SCHEDULER_TICK_SECS)? {
            config.scheduler_tick_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfigValue("page size must be positive".into()));
        }
        if self.max_pages == 0 {
            return Err(Error::InvalidConfigValue("max pages must be positive".into()));
        }
        if self.page_retry.max_attempts == 0 {
            return Err(Error::InvalidConfigValue(
                "page retry attempts must be at least 1".into(),
            ));
        }
        if self.error_log_capacity == 0 {
            return Err(Error::InvalidConfigValue(
                "error log capacity must be positive".into(),
            ));
        }
        if self.scheduler_tick_secs == 0 {
            return Err(Error::InvalidConfigValue(
                "scheduler tick must be positive".into(),
            ));
        }
        for (api, limit) in &self.rate_limits {
            if limit.calls_limit == 0 || limit.window_ms == 0 {
                return Err(Error::InvalidConfigValue(format!(
                    "rate limit for '{}' needs a positive call count and window",
                    api
                )));
            }
        }
        Ok(())
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::InvalidConfigValue(format!("{}='{}' is not a valid value", name, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 50);
        assert_eq!(config.page_retry.max_attempts, 3);
        assert_eq!(config.rate_limits[NHANH_API], RateLimitConfig::new(150, 30_000));
        assert_eq!(config.rate_limits[SHOPIFY_API], RateLimitConfig::new(40, 20_000));
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncEngineConfig::from_lookup(lookup_from(&[
            (ENV_PAGE_SIZE, "20"),
            (ENV_PAGE_RETRY_ATTEMPTS, " 5 "),
            (ENV_SCHEDULER_TICK_SECS, ""),
        ]))
        .unwrap();

        assert_eq!(config.page_size, 20);
        assert_eq!(config.page_retry.max_attempts, 5);
        assert_eq!(config.scheduler_tick_secs, 60);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let err = SyncEngineConfig::from_lookup(lookup_from(&[(ENV_PAGE_SIZE, "fifty")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue(msg) if msg.contains(ENV_PAGE_SIZE)));

        let err = SyncEngineConfig::from_lookup(lookup_from(&[(ENV_ERROR_LOG_CAPACITY, "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue(_)));
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let mut config = SyncEngineConfig::default();
        config
            .rate_limits
            .insert("shopify".to_string(), RateLimitConfig::new(0, 1_000));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(20), Duration::from_millis(30_000));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncEngineConfig =
            serde_json::from_str(r#"{"pageSize": 25, "pageRetry": {"maxAttempts": 4}}"#).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.page_retry.max_attempts, 4);
        assert_eq!(config.page_retry.initial_backoff_ms, 500);
        assert_eq!(config.error_log_capacity, 100);
    }
}
