// Shared test helpers: file-backed databases and scripted pipeline stages.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use proxy_harvest::collectors::{Collector, RawDocument};
use proxy_harvest::error_handling::ProcessingStats;
use proxy_harvest::fetch::{ResilientFetcher, RetryPolicy};
use proxy_harvest::geoip::GeoResolver;
use proxy_harvest::normalize::EndpointCandidate;
use proxy_harvest::storage::{init_db_pool_with_path, run_migrations};
use proxy_harvest::validate::{ProbeBackend, Validator};
use proxy_harvest::{CycleSettings, Pipeline};

/// Opens a database file with the schema applied.
pub async fn create_test_pool_with_path(db_path: &Path) -> Arc<Pool<Sqlite>> {
    let pool = init_db_pool_with_path(db_path)
        .await
        .expect("Failed to create test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

/// Fetcher with a single attempt and no waiting.
#[allow(dead_code)] // Used by other test files
pub fn quick_fetcher() -> ResilientFetcher {
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    };
    ResilientFetcher::new(
        Arc::new(reqwest::Client::new()),
        policy,
        Arc::new(ProcessingStats::new()),
    )
}

/// Returns fixed documents.
pub struct FixedCollector(pub Vec<RawDocument>);

#[async_trait]
impl Collector for FixedCollector {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn collect(&self) -> Vec<RawDocument> {
        self.0.clone()
    }
}

/// Alive exactly for the hosts in `alive`, which can change between cycles.
#[derive(Default)]
pub struct ScriptedProbe {
    pub alive: std::sync::Mutex<HashMap<String, f64>>,
}

impl ScriptedProbe {
    pub fn set_alive(&self, hosts: &[(&str, f64)]) {
        let mut alive = self.alive.lock().unwrap();
        alive.clear();
        for (host, latency) in hosts {
            alive.insert(host.to_string(), *latency);
        }
    }

    fn latency(&self, c: &EndpointCandidate) -> Option<f64> {
        self.alive.lock().unwrap().get(&c.host).copied()
    }
}

#[async_trait]
impl ProbeBackend for ScriptedProbe {
    async fn full_proxy(&self, c: &EndpointCandidate, _: Duration) -> Option<f64> {
        self.latency(c)
    }
    async fn tunneled_proxy(&self, c: &EndpointCandidate, _: Duration) -> Option<f64> {
        self.latency(c)
    }
    async fn connectivity_only(&self, c: &EndpointCandidate, _: Duration) -> Option<f64> {
        self.latency(c)
    }
}

/// Answers from a fixed table and counts lookups.
#[derive(Default)]
pub struct TableGeo {
    pub answers: HashMap<IpAddr, String>,
    pub lookups: AtomicUsize,
}

#[async_trait]
impl GeoResolver for TableGeo {
    async fn country_for_ip(&self, ip: IpAddr) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.answers.get(&ip).cloned()
    }
}

pub fn build_test_pipeline(
    pool: Arc<Pool<Sqlite>>,
    collectors: Vec<Arc<dyn Collector>>,
    probe: Arc<ScriptedProbe>,
    geo: Arc<TableGeo>,
    settings: CycleSettings,
) -> Pipeline {
    let stats = Arc::new(ProcessingStats::new());
    let validator = Validator::new(probe, Arc::clone(&stats));
    Pipeline::new(pool, collectors, validator, geo, stats, settings)
}
