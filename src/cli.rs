//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use proxy_harvest::config::{
    DAEMON_INTERVAL_MINUTES, DB_PATH, DEAD_RETENTION_DAYS, DEFAULT_TIMEOUT_SECS, GITHUB_API_BASE,
    GITHUB_CODE_PAGES, GITHUB_MAX_BLOB_BYTES, GITHUB_PER_PAGE, GITHUB_REPO_PAGES, MAX_CANDIDATES_PER_CYCLE, MAX_QUOTA_WAIT,
    OBSERVATION_RETENTION_DAYS, PROVIDER_CONCURRENCY, REPO_RESCAN_DAYS, RETRY_BASE_DELAY_MS,
    RETRY_MAX_ATTEMPTS, VALIDATOR_CONCURRENCY,
};
use proxy_harvest::{Config, GithubConfig, LogFormat, LogLevel};

/// Harvests, validates and ranks public proxy endpoints.
///
/// # Examples
///
/// ```bash
/// # One cycle over a couple of plain lists
/// proxy_harvest run-once --source-url https://example.com/socks5.txt
///
/// # Every 15 minutes, GitHub included
/// GITHUB_TOKEN=... proxy_harvest daemon
///
/// # Best German proxies
/// proxy_harvest top --country DE --limit 20
/// ```
#[derive(Debug, Parser)]
#[command(name = "proxy_harvest", version, about = "Harvests, validates and ranks public proxy endpoints.")]
pub struct Opt {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info, env = "PROXY_HARVEST_LOG_LEVEL", global = true)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, env = "PROXY_HARVEST_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Database path (SQLite file)
    #[arg(long, value_parser, default_value = DB_PATH, env = "PROXY_HARVEST_DB_PATH", global = true)]
    pub db_path: PathBuf,

    /// Days after which an analyzed repository may be queued again
    #[arg(long, default_value_t = REPO_RESCAN_DAYS, env = "PROXY_HARVEST_REPO_RESCAN_DAYS", global = true)]
    pub repo_rescan_days: u32,

    #[command(subcommand)]
    pub command: Command,
}

impl Opt {
    /// Configuration from the options shared by every command; the rest
    /// keeps its defaults.
    pub fn base_config(&self) -> Config {
        Config {
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            db_path: self.db_path.clone(),
            repo_rescan_days: self.repo_rescan_days,
            ..Config::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one harvesting cycle and print its statistics as JSON
    RunOnce(HarvestArgs),

    /// Run cycles on a fixed interval until Ctrl-C
    Daemon {
        #[command(flatten)]
        harvest: HarvestArgs,

        /// Minutes between the end of one cycle and the start of the next
        #[arg(long, default_value_t = DAEMON_INTERVAL_MINUTES, env = "PROXY_HARVEST_INTERVAL_MINUTES")]
        interval_minutes: u64,
    },

    /// Queue a GitHub repository for a deep scan
    Enqueue {
        /// `owner/repo` or any text containing a github.com/owner/repo URL
        repo: String,

        /// Free-text note stored with the task
        #[arg(long)]
        note: Option<String>,

        /// Requeue even if the repository was analyzed recently
        #[arg(long)]
        force: bool,
    },

    /// Print the best alive proxies as JSON
    Top {
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Only these country codes (repeatable or comma separated)
        #[arg(long = "country", value_delimiter = ',')]
        countries: Vec<String>,
    },

    /// Print repository queue counts and the oldest pending repositories
    Queue {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Print dashboard figures
    Stats,

    /// Print recorded cycles, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Options shared by the commands that run cycles.
#[derive(Debug, Args)]
pub struct HarvestArgs {
    /// Per-operation timeout for validation checks and geo lookups, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "PROXY_HARVEST_TIMEOUT_SECONDS")]
    pub timeout_seconds: u64,

    /// Maximum concurrent validation checks
    #[arg(long, default_value_t = VALIDATOR_CONCURRENCY, env = "PROXY_HARVEST_VALIDATOR_CONCURRENCY")]
    pub validator_concurrency: usize,

    /// Maximum concurrent calls per rate-limited provider
    #[arg(long, default_value_t = PROVIDER_CONCURRENCY, env = "PROXY_HARVEST_PROVIDER_CONCURRENCY")]
    pub provider_concurrency: usize,

    #[arg(long, default_value_t = DEAD_RETENTION_DAYS, env = "PROXY_HARVEST_DEAD_RETENTION_DAYS")]
    pub dead_retention_days: u32,

    #[arg(long, default_value_t = OBSERVATION_RETENTION_DAYS, env = "PROXY_HARVEST_OBSERVATION_RETENTION_DAYS")]
    pub observation_retention_days: u32,

    #[arg(long, default_value_t = RETRY_MAX_ATTEMPTS)]
    pub retry_max_attempts: usize,

    #[arg(long, default_value_t = RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: u64,

    /// Longest quota reset worth waiting for, in seconds
    #[arg(long, default_value_t = MAX_QUOTA_WAIT.as_secs())]
    pub max_quota_wait_secs: u64,

    /// Verification endpoint for proxy checks (repeatable; built-in list when omitted)
    #[arg(long = "verification-endpoint", value_delimiter = ',', env = "PROXY_HARVEST_VERIFICATION_ENDPOINTS")]
    pub verification_endpoints: Vec<String>,

    /// Plain URL whose body is scanned for proxies (repeatable)
    #[arg(long = "source-url", value_delimiter = ',', env = "PROXY_HARVEST_SOURCE_URLS")]
    pub source_urls: Vec<String>,

    /// GitHub API token; GitHub harvesting is disabled without one
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub search query (repeatable; built-in list when omitted)
    #[arg(long = "github-query", value_delimiter = ',', env = "PROXY_HARVEST_GITHUB_QUERIES")]
    pub github_queries: Vec<String>,

    #[arg(long, default_value_t = GITHUB_CODE_PAGES)]
    pub github_code_pages: u32,

    #[arg(long, default_value_t = GITHUB_REPO_PAGES)]
    pub github_repo_pages: u32,

    #[arg(long, default_value_t = GITHUB_PER_PAGE)]
    pub github_per_page: u32,

    #[arg(long, default_value_t = GITHUB_MAX_BLOB_BYTES)]
    pub github_max_blob_bytes: u64,

    #[arg(long, default_value = GITHUB_API_BASE, env = "PROXY_HARVEST_GITHUB_API_BASE")]
    pub github_api_base: String,

    /// Keep only these country codes (comma separated)
    #[arg(long, value_delimiter = ',', env = "PROXY_HARVEST_COUNTRY_ALLOW")]
    pub country_allow: Vec<String>,

    /// Never keep these country codes (comma separated)
    #[arg(long, value_delimiter = ',', env = "PROXY_HARVEST_COUNTRY_DENY")]
    pub country_deny: Vec<String>,

    /// Candidates validated per cycle (0 = unlimited)
    #[arg(long, default_value_t = MAX_CANDIDATES_PER_CYCLE)]
    pub max_candidates: usize,

    /// Local GeoLite2 Country/City database; remote lookups are used without one
    #[arg(long, value_parser, env = "PROXY_HARVEST_GEOIP_PATH")]
    pub geoip: Option<PathBuf>,
}

impl HarvestArgs {
    /// Completes `base` (see [`Opt::base_config`]) with the harvesting
    /// options, falling back to built-in lists for empty list options.
    pub fn into_config(self, base: Config, daemon_interval_minutes: u64) -> Config {
        let github_defaults = GithubConfig::default();
        let verification_endpoints = non_empty_or(self.verification_endpoints, base.verification_endpoints.clone());

        Config {
            timeout_seconds: self.timeout_seconds,
            validator_concurrency: self.validator_concurrency,
            provider_concurrency: self.provider_concurrency,
            dead_retention_days: self.dead_retention_days,
            observation_retention_days: self.observation_retention_days,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
            max_quota_wait_secs: self.max_quota_wait_secs,
            verification_endpoints,
            source_urls: self.source_urls,
            github: GithubConfig {
                token: self.github_token.filter(|t| !t.trim().is_empty()),
                queries: non_empty_or(self.github_queries, github_defaults.queries),
                code_pages: self.github_code_pages,
                repo_pages: self.github_repo_pages,
                per_page: self.github_per_page,
                max_blob_bytes: self.github_max_blob_bytes,
                api_base: self.github_api_base,
            },
            country_allow: self.country_allow,
            country_deny: self.country_deny,
            max_candidates: self.max_candidates,
            geoip_path: self.geoip,
            daemon_interval_minutes,
            ..base
        }
    }
}

fn non_empty_or(values: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        fallback
    } else {
        values
    }
}
