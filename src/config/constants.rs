//! Configuration constants.
//!
//! This module defines all configuration constants used throughout the application,
//! including timeouts, concurrency caps, retention horizons and retry parameters.

use std::time::Duration;

/// Default SQLite database path
pub const DB_PATH: &str = "./proxy_harvest.db";

// Network operation timeouts
/// Per-call timeout for outbound requests and validation checks, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 4;
/// Timeout for collector and provider API requests, in seconds.
/// Source documents can be large, so this is looser than the validation timeout.
pub const COLLECTOR_TIMEOUT_SECS: u64 = 20;

// Concurrency caps
/// Maximum number of validation checks in flight at once.
/// Bounds the number of open sockets regardless of batch size.
pub const VALIDATOR_CONCURRENCY: usize = 100;
/// Maximum number of concurrent calls against a single rate-limited provider
pub const PROVIDER_CONCURRENCY: usize = 4;

// Retry strategy
/// Maximum number of attempts for a single fetch (initial attempt included)
pub const RETRY_MAX_ATTEMPTS: usize = 3;
/// Delay before the first retry; doubled on each following retry
pub const RETRY_BASE_DELAY_MS: u64 = 1000;
/// Upper bound on a single quota-reset suspension
pub const MAX_QUOTA_WAIT: Duration = Duration::from_secs(300);
/// Number of quota suspensions a single fetch may go through before giving up
pub const MAX_QUOTA_SUSPENSIONS: u32 = 5;

// Retention and re-scan policy
/// Dead records not re-checked for this many days are deleted
pub const DEAD_RETENTION_DAYS: u32 = 3;
/// Observation history rows older than this many days are deleted
pub const OBSERVATION_RETENTION_DAYS: u32 = 30;
/// A completed repository becomes eligible for re-analysis after this many days
pub const REPO_RESCAN_DAYS: u32 = 7;

// Scoring
/// Weight of the previous success rate when blending in a new observation
pub const SUCCESS_RATE_DECAY: f64 = 0.8;

// Pipeline
/// Interval between cycles when running as a daemon, in minutes
pub const DAEMON_INTERVAL_MINUTES: u64 = 15;
/// Maximum number of candidates validated per cycle (0 disables the cap)
pub const MAX_CANDIDATES_PER_CYCLE: usize = 0;

// GitHub collector
pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_CODE_PAGES: u32 = 5;
pub const GITHUB_REPO_PAGES: u32 = 5;
pub const GITHUB_PER_PAGE: u32 = 50;
/// Blobs larger than this are not downloaded during a repository deep scan
pub const GITHUB_MAX_BLOB_BYTES: u64 = 250_000;
/// Maximum number of files accepted per code-search query
pub const GITHUB_MAX_FILES_PER_QUERY: usize = 80;
/// Maximum number of tree blobs fetched per repository
pub const GITHUB_MAX_BLOBS_PER_REPO: usize = 200;
/// Maximum number of queued repositories picked up per cycle
pub const GITHUB_QUEUE_BATCH: i64 = 100;

/// Independent "what is my IP" endpoints used by the full-proxy and tunneled checks.
/// Tried in order; the first non-5xx answer proves the proxy works.
pub const VERIFICATION_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org?format=json",
    "https://httpbin.org/ip",
    "https://ifconfig.me/ip",
];

/// Remote country lookup endpoint (`{ip}` is substituted)
pub const REMOTE_GEO_URL_TEMPLATE: &str = "https://ipapi.co/{ip}/country/";

/// User-Agent sent with collector and provider requests
pub const DEFAULT_USER_AGENT: &str = concat!("proxy_harvest/", env!("CARGO_PKG_VERSION"));

/// Milliseconds in one day, for retention cutoffs
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
