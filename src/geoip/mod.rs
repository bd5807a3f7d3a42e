//! Country resolution for IP literals.
//!
//! Two backends implement [`GeoResolver`]:
//! - [`MaxMindGeoResolver`] reads a local GeoLite2 database, no network
//! - [`RemoteGeoResolver`] asks a public HTTP API through the resilient fetcher
//!
//! [`CachingGeoResolver`] wraps either one with an explicit [`GeoCache`]
//! that lives as long as the process and remembers misses too.

mod cache;
mod maxmind;
mod remote;

use std::net::IpAddr;

use async_trait::async_trait;

pub use cache::{CachingGeoResolver, GeoCache};
pub use maxmind::MaxMindGeoResolver;
pub use remote::RemoteGeoResolver;

/// Maps an IP address to an ISO 3166-1 alpha-2 country code.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn country_for_ip(&self, ip: IpAddr) -> Option<String>;
}

/// Normalizes a raw country answer to two uppercase ASCII letters.
pub(crate) fn normalize_country_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(code)
}
