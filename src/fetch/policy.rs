//! Retry policy and provider quota detection.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::{
    Config, MAX_QUOTA_SUSPENSIONS, RETRY_BASE_DELAY_MS, RETRY_MAX_ATTEMPTS,
};

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// How a [`ResilientFetcher`](super::ResilientFetcher) retries one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for transient failures, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry; doubled for each following retry.
    pub base_delay: Duration,
    /// Longest quota reset the fetcher will sleep through.
    pub max_quota_wait: Duration,
    /// Quota suspensions allowed for one request before giving up.
    pub max_quota_suspensions: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_quota_wait: Duration::from_secs(config.max_quota_wait_secs),
            max_quota_suspensions: MAX_QUOTA_SUSPENSIONS,
        }
    }

    /// Delays between attempts: `base`, `2*base`, `4*base`, ...
    ///
    /// The schedule has `max_attempts - 1` entries so that the initial call
    /// plus one call per entry equals `max_attempts`.
    pub fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        (0..self.max_attempts.saturating_sub(1) as u32).map(move |n| base.saturating_mul(1 << n.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_quota_wait: crate::config::MAX_QUOTA_WAIT,
            max_quota_suspensions: MAX_QUOTA_SUSPENSIONS,
        }
    }
}

/// Returns how long to wait if the response signals an exhausted quota.
///
/// Recognized signals, on 403 or 429 only:
/// - `x-ratelimit-remaining: 0` with `x-ratelimit-reset: <epoch seconds>`
/// - `Retry-After: <seconds>`
///
/// A bare 403/429 without either signal is an ordinary rejection.
pub fn quota_wait(status: StatusCode, headers: &HeaderMap, now_epoch_secs: i64) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    let remaining = header_str(RATE_LIMIT_REMAINING).and_then(|v| v.parse::<u64>().ok());
    let reset = header_str(RATE_LIMIT_RESET).and_then(|v| v.parse::<i64>().ok());
    if let (Some(0), Some(reset_at)) = (remaining, reset) {
        let secs = reset_at.saturating_sub(now_epoch_secs).max(0) as u64;
        return Some(Duration::from_secs(secs));
    }

    header_str(RETRY_AFTER.as_str())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
