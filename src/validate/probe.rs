//! Network-backed probe strategies.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::ProbeBackend;
use crate::initialization::init_proxied_client;
use crate::normalize::{EndpointCandidate, ProxyProtocol};

/// Probes candidates over the network.
///
/// Proxy checks walk `endpoints` in order and stop at the first answer that
/// is not a 5xx. Several independent endpoints are used so one third party
/// being down does not mark every proxy dead.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    endpoints: Vec<String>,
}

impl NetworkProbe {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    /// Proxy URL understood by reqwest, or `None` for protocols that are not
    /// reachable as an HTTP or SOCKS proxy.
    pub(super) fn proxy_url(candidate: &EndpointCandidate) -> Option<String> {
        let scheme = match candidate.protocol {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            // Let the proxy resolve the verification hostnames.
            ProxyProtocol::Socks5 => "socks5h",
            ProxyProtocol::MtProto | ProxyProtocol::Shadowsocks | ProxyProtocol::VMess => return None,
        };
        let host = if candidate.host.contains(':') && !candidate.host.starts_with('[') {
            format!("[{}]", candidate.host)
        } else {
            candidate.host.clone()
        };
        Some(format!("{scheme}://{host}:{}", candidate.port))
    }

    async fn through_proxy(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64> {
        let proxy_url = Self::proxy_url(candidate)?;
        let client = match init_proxied_client(&proxy_url, timeout) {
            Ok(client) => client,
            Err(e) => {
                log::debug!("Cannot build client for {proxy_url}: {e}");
                return None;
            }
        };

        for endpoint in &self.endpoints {
            let started = Instant::now();
            match client.get(endpoint).send().await {
                Ok(response) if !response.status().is_server_error() => {
                    return Some(elapsed_ms(started));
                }
                Ok(response) => {
                    log::trace!("{candidate} -> {endpoint}: HTTP {}", response.status());
                }
                Err(e) => {
                    log::trace!("{candidate} -> {endpoint}: {e}");
                }
            }
        }
        None
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl ProbeBackend for NetworkProbe {
    async fn full_proxy(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64> {
        self.through_proxy(candidate, timeout).await
    }

    async fn tunneled_proxy(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64> {
        self.through_proxy(candidate, timeout).await
    }

    async fn connectivity_only(&self, candidate: &EndpointCandidate, timeout: Duration) -> Option<f64> {
        let started = Instant::now();
        let host = candidate.host.trim_start_matches('[').trim_end_matches(']');
        match tokio::time::timeout(timeout, TcpStream::connect((host, candidate.port))).await {
            Ok(Ok(_stream)) => Some(elapsed_ms(started)),
            Ok(Err(e)) => {
                log::trace!("{candidate}: connect failed: {e}");
                None
            }
            Err(_) => None,
        }
    }

    fn operations_per_check(&self) -> u32 {
        u32::try_from(self.endpoints.len()).unwrap_or(u32::MAX).max(1)
    }
}
