//! Configuration types.
//!
//! This module defines the library configuration and the logging option enums
//! shared with the command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::*;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// GitHub collector settings.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API token; the collector is disabled without one
    pub token: Option<String>,
    /// Search queries used for code and repository search
    pub queries: Vec<String>,
    /// Code search pages per query
    pub code_pages: u32,
    /// Repository search pages per query
    pub repo_pages: u32,
    /// Results per search page (clamped to 1..=100)
    pub per_page: u32,
    /// Largest blob downloaded during a repository deep scan
    pub max_blob_bytes: u64,
    /// API base URL (overridable for tests and GitHub Enterprise)
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            queries: ["proxy", "socks5", "mtproto", "shadowsocks"]
                .iter()
                .map(|q| q.to_string())
                .collect(),
            code_pages: GITHUB_CODE_PAGES,
            repo_pages: GITHUB_REPO_PAGES,
            per_page: GITHUB_PER_PAGE,
            max_blob_bytes: GITHUB_MAX_BLOB_BYTES,
            api_base: GITHUB_API_BASE.to_string(),
        }
    }
}

/// Library configuration (no CLI dependencies).
///
/// The loading mechanism is external: the binary builds this from flags and
/// environment variables, tests build it programmatically.
///
/// # Examples
///
/// ```no_run
/// use proxy_harvest::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     db_path: PathBuf::from("proxies.db"),
///     validator_concurrency: 200,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,

    /// Database path (SQLite file)
    pub db_path: PathBuf,

    /// Per-call timeout for validation checks and geo lookups, in seconds
    pub timeout_seconds: u64,

    /// Maximum concurrent validation checks
    pub validator_concurrency: usize,

    /// Maximum concurrent calls per rate-limited provider
    pub provider_concurrency: usize,

    /// Dead records older than this are purged after every cycle
    pub dead_retention_days: u32,

    /// Observation rows older than this are purged after every cycle
    pub observation_retention_days: u32,

    /// Age after which a completed repository may be queued again
    pub repo_rescan_days: u32,

    /// Attempts per fetch, initial attempt included
    pub retry_max_attempts: usize,

    /// Delay before the first retry, doubled per retry
    pub retry_base_delay_ms: u64,

    /// Cap on a single quota-reset suspension, in seconds
    pub max_quota_wait_secs: u64,

    /// Verification endpoints for full-proxy and tunneled checks
    pub verification_endpoints: Vec<String>,

    /// Plain URLs whose bodies are scanned for proxies
    pub source_urls: Vec<String>,

    /// GitHub collector settings
    pub github: GithubConfig,

    /// If non-empty, only records from these countries are kept
    pub country_allow: Vec<String>,

    /// Records from these countries are never kept
    pub country_deny: Vec<String>,

    /// Candidates validated per cycle (0 = unlimited)
    pub max_candidates: usize,

    /// Local GeoLite2 database; remote lookup is used when absent
    pub geoip_path: Option<PathBuf>,

    /// Interval between daemon cycles, in minutes
    pub daemon_interval_minutes: u64,
}

impl Config {
    /// Per-call timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Re-scan threshold as a `chrono::Duration`.
    pub fn rescan_threshold(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.repo_rescan_days))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            db_path: PathBuf::from(DB_PATH),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            validator_concurrency: VALIDATOR_CONCURRENCY,
            provider_concurrency: PROVIDER_CONCURRENCY,
            dead_retention_days: DEAD_RETENTION_DAYS,
            observation_retention_days: OBSERVATION_RETENTION_DAYS,
            repo_rescan_days: REPO_RESCAN_DAYS,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            max_quota_wait_secs: MAX_QUOTA_WAIT.as_secs(),
            verification_endpoints: VERIFICATION_ENDPOINTS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            source_urls: Vec::new(),
            github: GithubConfig::default(),
            country_allow: Vec::new(),
            country_deny: Vec::new(),
            max_candidates: MAX_CANDIDATES_PER_CYCLE,
            geoip_path: None,
            daemon_interval_minutes: DAEMON_INTERVAL_MINUTES,
        }
    }
}
