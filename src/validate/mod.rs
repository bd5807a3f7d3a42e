//! Liveness validation of endpoint candidates.
//!
//! Dispatch is a pure function of the candidate's protocol, see
//! [`ProxyProtocol::strategy`](crate::normalize::ProxyProtocol::strategy):
//! - HTTP/HTTPS proxies fetch a verification endpoint through the proxy
//! - SOCKS4/SOCKS5 proxies do the same over a SOCKS transport
//! - MTProto, Shadowsocks and VMess only get a TCP connect. This is a weak
//!   signal: it proves something listens on the port, not that the tunnel
//!   works.
//!
//! Batches run under one shared semaphore so the number of open sockets is
//! bounded no matter how many candidates a cycle produces.

mod probe;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

pub use probe::NetworkProbe;

use crate::error_handling::{ErrorType, ProcessingStats};
use crate::initialization::init_semaphore;
use crate::normalize::{EndpointCandidate, ValidationStrategy};

/// Extra time granted to a whole check on top of its per-operation timeouts.
const CHECK_DEADLINE_SLACK: Duration = Duration::from_secs(1);

/// Result of checking one candidate once. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub candidate: EndpointCandidate,
    pub alive: bool,
    /// Wall time of the successful probe; `None` when dead
    pub latency_ms: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationOutcome {
    /// Builds an outcome from a probe result: alive exactly when a latency was measured.
    pub fn from_probe(candidate: EndpointCandidate, latency_ms: Option<f64>) -> Self {
        Self {
            candidate,
            alive: latency_ms.is_some(),
            latency_ms,
            checked_at: Utc::now(),
        }
    }

    pub fn dead(candidate: EndpointCandidate) -> Self {
        Self::from_probe(candidate, None)
    }
}

/// The three probing strategies. Each returns the latency in milliseconds
/// when the candidate is alive.
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    async fn full_proxy(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64>;

    async fn tunneled_proxy(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64>;

    async fn connectivity_only(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64>;

    /// Upper bound on sequential network operations in one check, used to
    /// derive the whole-check deadline.
    fn operations_per_check(&self) -> u32 {
        1
    }
}

/// Runs probes for candidates, alone or in bounded-concurrency batches.
#[derive(Clone)]
pub struct Validator {
    backend: Arc<dyn ProbeBackend>,
    stats: Arc<ProcessingStats>,
}

impl Validator {
    pub fn new(backend: Arc<dyn ProbeBackend>, stats: Arc<ProcessingStats>) -> Self {
        Self { backend, stats }
    }

    /// Checks one candidate.
    ///
    /// `timeout` bounds every network operation of the probe; the probe as a
    /// whole is bounded by `timeout` times the backend's operation count.
    pub async fn check(&self, candidate: &EndpointCandidate, timeout: Duration) -> ValidationOutcome {
        probe_one(self.backend.as_ref(), candidate, timeout).await
    }

    /// Checks every candidate exactly once, at most `max_concurrent` at a time.
    ///
    /// Outcomes come back in completion order. A check that panics is recorded
    /// as dead for its candidate only.
    pub async fn check_many(
        &self,
        candidates: Vec<EndpointCandidate>,
        timeout: Duration,
        max_concurrent: usize,
    ) -> Vec<ValidationOutcome> {
        let total = candidates.len();
        let semaphore = init_semaphore(max_concurrent.max(1));
        let mut tasks = FuturesUnordered::new();
        let mut outcomes = Vec::with_capacity(total);

        for candidate in candidates {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                outcomes.push(ValidationOutcome::dead(candidate));
                continue;
            };
            let backend = Arc::clone(&self.backend);
            let task_candidate = candidate.clone();
            let handle = tokio::spawn(async move {
                let outcome = probe_one(backend.as_ref(), &task_candidate, timeout).await;
                drop(permit);
                outcome
            });
            tasks.push(async move { (candidate, handle.await) });
        }

        while let Some((candidate, joined)) = tasks.next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    log::warn!("Validation task for {candidate} failed: {e}");
                    self.stats.increment_error(ErrorType::ValidationTaskFailed);
                    outcomes.push(ValidationOutcome::dead(candidate));
                }
            }
        }

        let alive = outcomes.iter().filter(|o| o.alive).count();
        log::info!("Validated {total} candidates: {alive} alive");
        outcomes
    }
}

async fn probe_one(
    backend: &dyn ProbeBackend,
    candidate: &EndpointCandidate,
    timeout: Duration,
) -> ValidationOutcome {
    let deadline = timeout.saturating_mul(backend.operations_per_check().max(1)) + CHECK_DEADLINE_SLACK;

    let probe = async {
        match candidate.protocol.strategy() {
            ValidationStrategy::FullProxy => backend.full_proxy(candidate, timeout).await,
            ValidationStrategy::TunneledProxy => backend.tunneled_proxy(candidate, timeout).await,
            ValidationStrategy::ConnectivityOnly => backend.connectivity_only(candidate, timeout).await,
        }
    };

    let latency = match tokio::time::timeout(deadline, probe).await {
        Ok(latency) => latency,
        Err(_) => {
            log::debug!("{candidate} check exceeded {}ms", deadline.as_millis());
            None
        }
    };
    ValidationOutcome::from_probe(candidate.clone(), latency)
}
