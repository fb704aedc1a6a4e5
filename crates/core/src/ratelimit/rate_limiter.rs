//! Sliding-window rate limiter for the external APIs.
//!
//! Each API gets its own call window: at most `calls_limit` grants within any
//! span of `window_ms`. A single limiter is shared by every running job, so
//! concurrent syncs against the same API draw from the same budget.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Type alias for external API identifier.
pub type ApiName = Cow<'static, str>;

/// Default rate limit: 60 calls per minute.
const DEFAULT_CALLS_LIMIT: u32 = 60;
const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Rate limit configuration for one API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Maximum calls permitted per window.
    pub calls_limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn new(calls_limit: u32, window_ms: u64) -> Self {
        Self {
            calls_limit,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CALLS_LIMIT, DEFAULT_WINDOW_MS)
    }
}

/// Result of a non-blocking acquisition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// Budget exhausted; retry after this long.
    Wait(Duration),
}

/// Snapshot of an API's remaining allowance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateBudget {
    pub api_name: String,
    /// Oldest grant still inside the window, or now when the window is empty.
    pub window_start: Instant,
    pub calls_used: u32,
    pub calls_limit: u32,
    pub window_duration_ms: u64,
}

impl RateBudget {
    pub fn remaining(&self) -> u32 {
        self.calls_limit.saturating_sub(self.calls_used)
    }
}

/// Grant log for a single API.
#[derive(Debug)]
struct CallWindow {
    /// Grant instants inside the current window, oldest first.
    grants: VecDeque<Instant>,
    limit: u32,
    window: Duration,
}

impl CallWindow {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            grants: VecDeque::new(),
            limit: config.calls_limit.max(1),
            window: config.window(),
        }
    }

    /// Drop grants that have left the window.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if now >= oldest + self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_acquire(&mut self, now: Instant) -> Acquire {
        self.expire(now);

        if (self.grants.len() as u32) < self.limit {
            self.grants.push_back(now);
            return Acquire::Granted;
        }

        match self.grants.front() {
            Some(&oldest) => Acquire::Wait((oldest + self.window).saturating_duration_since(now)),
            None => Acquire::Granted,
        }
    }

    fn budget(&mut self, api_name: &str, now: Instant) -> RateBudget {
        self.expire(now);
        RateBudget {
            api_name: api_name.to_string(),
            window_start: self.grants.front().copied().unwrap_or(now),
            calls_used: self.grants.len() as u32,
            calls_limit: self.limit,
            window_duration_ms: self.window.as_millis() as u64,
        }
    }
}

/// Thread-safe limiter keeping one call window per API.
///
/// Windows are created on demand with default settings, or can be
/// pre-configured with custom limits.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, CallWindow>>,
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter pre-configured with per-API limits.
    pub fn with_configs(configs: &HashMap<String, RateLimitConfig>) -> Self {
        let limiter = Self::new();
        for (api, config) in configs {
            limiter.configure(&Cow::Owned(api.clone()), config.clone());
        }
        limiter
    }

    /// Lock the windows mutex, recovering from poison if necessary.
    ///
    /// A poisoned window map only risks a slightly wrong budget.
    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, CallWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter windows mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for a specific API. Resets its current window.
    pub fn configure(&self, api: &ApiName, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(api.to_string(), config);
        drop(configs);

        let mut windows = self.lock_windows();
        windows.remove(api.as_ref());
    }

    /// Acquire permission for one call, waiting until the budget allows it.
    ///
    /// Never fails and never drops the call; it only delays the caller.
    pub async fn acquire(&self, api: &ApiName) {
        loop {
            match self.try_acquire(api) {
                Acquire::Granted => return,
                Acquire::Wait(wait_time) => {
                    debug!("Rate limiter: waiting {:?} for '{}'", wait_time, api);
                    tokio::time::sleep(wait_time).await;
                }
            }
        }
    }

    /// Try to acquire permission without waiting.
    pub fn try_acquire(&self, api: &ApiName) -> Acquire {
        let now = Instant::now();
        let mut windows = self.lock_windows();

        let window = windows
            .entry(api.to_string())
            .or_insert_with(|| self.create_window(api));

        window.try_acquire(now)
    }

    /// Current budget for an API.
    pub fn budget(&self, api: &ApiName) -> RateBudget {
        let now = Instant::now();
        let mut windows = self.lock_windows();

        let window = windows
            .entry(api.to_string())
            .or_insert_with(|| self.create_window(api));

        window.budget(api, now)
    }

    /// Forget all grants recorded for an API.
    pub fn reset(&self, api: &ApiName) {
        let mut windows = self.lock_windows();
        windows.remove(api.as_ref());
    }

    fn create_window(&self, api: &ApiName) -> CallWindow {
        let configs = self.lock_configs();

        match configs.get(api.as_ref()) {
            Some(config) => CallWindow::new(config),
            None => CallWindow::new(&RateLimitConfig::default()),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
