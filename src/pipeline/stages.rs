//! Stage helpers for [`Pipeline::run_cycle`](super::Pipeline::run_cycle).

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use futures::future::join_all;

use crate::collectors::{Collector, RawDocument};
use crate::error_handling::{ErrorType, ProcessingStats};
use crate::geoip::GeoResolver;
use crate::storage::ResolvedOutcome;
use crate::validate::ValidationOutcome;

/// Runs every collector in its own task and concatenates their documents.
///
/// A collector that panics contributes nothing; the others are unaffected.
pub(super) async fn collect_all(collectors: &[Arc<dyn Collector>], stats: &ProcessingStats) -> Vec<RawDocument> {
    let handles = collectors.iter().map(|collector| {
        let collector = Arc::clone(collector);
        tokio::spawn(async move { collector.collect().await })
    });
    let results = join_all(handles).await;

    let mut documents = Vec::new();
    for (collector, result) in collectors.iter().zip(results) {
        match result {
            Ok(docs) => {
                log::info!("Collector {} returned {} documents", collector.name(), docs.len());
                documents.extend(docs);
            }
            Err(e) => {
                log::warn!("Collector {} failed: {e}", collector.name());
                stats.increment_error(ErrorType::CollectorFailed);
            }
        }
    }
    documents
}

/// IP literal of a host, with or without IPv6 brackets.
pub(super) fn host_ip(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[').trim_end_matches(']').parse().ok()
}

/// Attaches a country to every outcome.
///
/// Each distinct IP among alive outcomes is looked up exactly once; dead
/// outcomes and domain-name hosts get no country.
pub(super) async fn resolve_countries(
    outcomes: Vec<ValidationOutcome>,
    geo: &dyn GeoResolver,
    stats: &ProcessingStats,
) -> Vec<ResolvedOutcome> {
    let ips: HashSet<IpAddr> = outcomes
        .iter()
        .filter(|o| o.alive)
        .filter_map(|o| host_ip(&o.candidate.host))
        .collect();

    let ips: Vec<IpAddr> = ips.into_iter().collect();
    let answers = join_all(ips.iter().map(|ip| geo.country_for_ip(*ip))).await;
    let countries: HashMap<IpAddr, Option<String>> = ips.into_iter().zip(answers).collect();

    let misses = countries.values().filter(|c| c.is_none()).count();
    for _ in 0..misses {
        stats.increment_error(ErrorType::GeoLookupMiss);
    }
    log::info!("Resolved {} distinct IPs ({misses} unknown)", countries.len());

    outcomes
        .into_iter()
        .map(|outcome| {
            let country = if outcome.alive {
                host_ip(&outcome.candidate.host)
                    .and_then(|ip| countries.get(&ip).cloned())
                    .flatten()
            } else {
                None
            };
            ResolvedOutcome { outcome, country }
        })
        .collect()
}

/// Unknown countries always pass; known ones must be allowed and not denied.
pub(super) fn country_allowed(country: Option<&str>, allow: &[String], deny: &[String]) -> bool {
    match country {
        None => true,
        Some(code) => (allow.is_empty() || allow.iter().any(|a| a == code)) && !deny.iter().any(|d| d == code),
    }
}
