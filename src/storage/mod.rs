//! Durable state: proxy records, observation history, the repository task
//! queue and cycle history.
//!
//! Every write to the database goes through this module. Proxy upserts and
//! the two purges each run as a single unit of work.

pub mod dashboard;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod proxies;
pub mod queue;
pub mod runs;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dashboard::{dashboard_stats, CountryCount, DashboardStats};
pub use migrations::run_migrations;
pub use models::{CycleStats, ProxyRecord, RepoStatus, RepoTask};
pub use pool::init_db_pool_with_path;
pub use proxies::{
    batch_upsert, compute_score, get_proxy, next_success_rate, purge_dead_before,
    purge_dead_older_than, purge_observations_before, purge_observations_older_than,
    top_by_score, ResolvedOutcome,
};
pub use queue::{
    complete_repo, complete_repo_at, enqueue_repo, enqueue_repo_at, get_repo_task, parse_repo_id,
    pending_repos, queue_stats, EnqueueResult, QueueStats,
};
pub use runs::{last_cycle_stats, query_cycle_history, record_cycle};

/// Current time as epoch milliseconds, the unit of every `*_ms` column.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cutoff `days` before `now_ms`.
pub(crate) fn cutoff_ms(now_ms: i64, days: u32) -> i64 {
    now_ms - i64::from(days) * crate::config::MS_PER_DAY
}
