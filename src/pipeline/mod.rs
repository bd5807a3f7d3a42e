//! One harvesting cycle, end to end.
//!
//! Stages run in strict order, each one concurrent inside:
//! collectors -> normalizer -> validator -> geo -> storage -> expiry.
//! A failing collector, probe, lookup or write degrades the cycle's output;
//! the cycle itself always finishes and reports its counts.

mod daemon;
mod init;
mod stages;


use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::{Pool, Sqlite};

pub use daemon::run_daemon;
pub use init::build_pipeline;

use crate::collectors::Collector;
use crate::config::Config;
use crate::error_handling::{ErrorType, ProcessingStats};
use crate::geoip::GeoResolver;
use crate::normalize::{extract, prepare_candidates, ProxyProtocol};
use crate::storage::{
    batch_upsert, purge_dead_older_than, purge_observations_older_than, record_cycle, CycleStats,
};
use crate::validate::Validator;

/// Per-cycle knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Per-operation validation timeout
    pub timeout: Duration,
    pub validator_concurrency: usize,
    /// Cap on validated candidates (0 = unlimited)
    pub max_candidates: usize,
    pub dead_retention_days: u32,
    pub observation_retention_days: u32,
    /// Uppercase country codes; empty means every country
    pub country_allow: Vec<String>,
    /// Uppercase country codes never persisted
    pub country_deny: Vec<String>,
    /// Protocol given to scheme-less matches
    pub default_protocol: ProxyProtocol,
}

fn upper_all(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.timeout(),
            validator_concurrency: config.validator_concurrency.max(1),
            max_candidates: config.max_candidates,
            dead_retention_days: config.dead_retention_days,
            observation_retention_days: config.observation_retention_days,
            country_allow: upper_all(&config.country_allow),
            country_deny: upper_all(&config.country_deny),
            default_protocol: ProxyProtocol::Http,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a cycle needs. Built once and reused by the daemon.
pub struct Pipeline {
    pool: Arc<Pool<Sqlite>>,
    collectors: Vec<Arc<dyn Collector>>,
    validator: Validator,
    geo: Arc<dyn GeoResolver>,
    stats: Arc<ProcessingStats>,
    settings: CycleSettings,
}

impl Pipeline {
    pub fn new(
        pool: Arc<Pool<Sqlite>>,
        collectors: Vec<Arc<dyn Collector>>,
        validator: Validator,
        geo: Arc<dyn GeoResolver>,
        stats: Arc<ProcessingStats>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            pool,
            collectors,
            validator,
            geo,
            stats,
            settings,
        }
    }

    pub fn pool(&self) -> &Arc<Pool<Sqlite>> {
        &self.pool
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.stats
    }

    /// Runs one full cycle and returns its counts.
    ///
    /// Never fails: a failed batch write shows up as `persist_failed` and
    /// the counts of the earlier stages are still reported and recorded.
    pub async fn run_cycle(&self) -> CycleStats {
        // Counters cover one cycle; the summary below reports only this one.
        self.stats.reset();
        let started = Instant::now();
        let started_at_ms = Utc::now().timestamp_millis();
        log::info!("Cycle started with {} collectors", self.collectors.len());

        let documents = stages::collect_all(&self.collectors, &self.stats).await;
        let raw_sources = documents.len();

        let batches = documents
            .iter()
            .map(|doc| extract(&doc.text, &doc.source, self.settings.default_protocol));
        let candidates = prepare_candidates(batches, self.settings.max_candidates);
        log::info!("Normalized {raw_sources} documents into {} candidates", candidates.len());
        let candidate_count = candidates.len();

        let outcomes = self
            .validator
            .check_many(candidates, self.settings.timeout, self.settings.validator_concurrency)
            .await;
        let alive = outcomes.iter().filter(|o| o.alive).count();

        let resolved = stages::resolve_countries(outcomes, self.geo.as_ref(), &self.stats).await;
        let kept: Vec<_> = resolved
            .into_iter()
            .filter(|r| {
                stages::country_allowed(
                    r.country.as_deref(),
                    &self.settings.country_allow,
                    &self.settings.country_deny,
                )
            })
            .collect();

        let (saved, persist_failed) = match batch_upsert(&self.pool, &kept).await {
            Ok(saved) => (saved, false),
            Err(e) => {
                log::error!("Persisting {} outcomes failed, batch rolled back: {e}", kept.len());
                self.stats.increment_error(ErrorType::PersistenceFailed);
                (0, true)
            }
        };

        let removed_dead = match purge_dead_older_than(&self.pool, self.settings.dead_retention_days).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Purging dead records failed: {e}");
                self.stats.increment_error(ErrorType::PurgeFailed);
                0
            }
        };
        let removed_observations =
            match purge_observations_older_than(&self.pool, self.settings.observation_retention_days).await {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("Purging observations failed: {e}");
                    self.stats.increment_error(ErrorType::PurgeFailed);
                    0
                }
            };

        let stats = CycleStats {
            started_at_ms,
            finished_at_ms: Utc::now().timestamp_millis(),
            raw_sources,
            candidates: candidate_count,
            alive,
            saved,
            removed_dead,
            removed_observations,
            persist_failed,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };

        if let Err(e) = record_cycle(&self.pool, &stats).await {
            log::warn!("Recording cycle statistics failed: {e}");
        }

        log::info!(
            "Cycle finished in {:.1}s: sources={} candidates={} alive={} saved={} removed_dead={} removed_observations={}{}",
            stats.elapsed_seconds,
            stats.raw_sources,
            stats.candidates,
            stats.alive,
            stats.saved,
            stats.removed_dead,
            stats.removed_observations,
            if stats.persist_failed { " (persistence failed)" } else { "" }
        );
        self.stats.log_summary();
        stats
    }
}
