//! Builds a [`Pipeline`] from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use super::{CycleSettings, Pipeline};
use crate::collectors::{Collector, GithubCollector, UrlListCollector};
use crate::config::{Config, COLLECTOR_TIMEOUT_SECS, DEFAULT_USER_AGENT, REMOTE_GEO_URL_TEMPLATE};
use crate::error_handling::ProcessingStats;
use crate::fetch::{ProviderLimiter, ResilientFetcher, RetryPolicy};
use crate::geoip::{CachingGeoResolver, GeoCache, GeoResolver, MaxMindGeoResolver, RemoteGeoResolver};
use crate::initialization::init_client;
use crate::storage::{init_db_pool_with_path, run_migrations};
use crate::validate::{NetworkProbe, Validator};

/// Opens the database, applies migrations and wires every stage.
///
/// # Errors
///
/// Fails when the database cannot be opened or migrated, or when an HTTP
/// client cannot be built. A broken GeoIP database only logs a warning and
/// falls back to remote lookups.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let pool = init_db_pool_with_path(&config.db_path)
        .await
        .context("Failed to initialize database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let stats = Arc::new(ProcessingStats::new());
    let policy = RetryPolicy::from_config(config);

    let collector_client = init_client(Duration::from_secs(COLLECTOR_TIMEOUT_SECS), DEFAULT_USER_AGENT)
        .context("Failed to initialize collector HTTP client")?;
    let fetcher = ResilientFetcher::new(collector_client, policy.clone(), Arc::clone(&stats));

    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
    if !config.source_urls.is_empty() {
        collectors.push(Arc::new(UrlListCollector::new(fetcher.clone(), config.source_urls.clone())));
    }
    let github_limiter = ProviderLimiter::new("github", config.provider_concurrency.max(1));
    collectors.push(Arc::new(
        GithubCollector::new(
            fetcher.with_limiter(github_limiter),
            config.github.clone(),
            config.provider_concurrency,
        )
        .with_queue(Arc::clone(&pool)),
    ));

    let geo = init_geo(config, policy, Arc::clone(&stats)).await?;

    let probe = NetworkProbe::new(config.verification_endpoints.clone());
    let validator = Validator::new(Arc::new(probe), Arc::clone(&stats));

    info!(
        "Pipeline ready: {} collectors, validator concurrency {}, timeout {}s",
        collectors.len(),
        config.validator_concurrency,
        config.timeout_seconds
    );

    Ok(Pipeline::new(
        pool,
        collectors,
        validator,
        geo,
        stats,
        CycleSettings::from_config(config),
    ))
}

async fn init_geo(config: &Config, policy: RetryPolicy, stats: Arc<ProcessingStats>) -> Result<Arc<dyn GeoResolver>> {
    let cache = Arc::new(GeoCache::new());

    if let Some(path) = &config.geoip_path {
        match MaxMindGeoResolver::open(path).await {
            Ok(resolver) => {
                info!("Using local GeoIP database {}", path.display());
                return Ok(Arc::new(CachingGeoResolver::new(Arc::new(resolver), cache)));
            }
            Err(e) => {
                warn!("Failed to open GeoIP database {}: {e}. Falling back to remote lookups.", path.display());
            }
        }
    }

    let client = init_client(config.timeout(), DEFAULT_USER_AGENT).context("Failed to initialize geo HTTP client")?;
    let limiter = ProviderLimiter::new("geo", config.provider_concurrency.max(1));
    let fetcher = ResilientFetcher::new(client, policy, stats).with_limiter(limiter);
    let remote = RemoteGeoResolver::new(fetcher, REMOTE_GEO_URL_TEMPLATE);
    Ok(Arc::new(CachingGeoResolver::new(Arc::new(remote), cache)))
}
