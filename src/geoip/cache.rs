//! Process-lifetime geo cache.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::GeoResolver;

/// IP to country answers, including "unknown" answers.
///
/// Populated lazily and never evicted; it is dropped with the process.
#[derive(Debug, Default)]
pub struct GeoCache {
    entries: RwLock<HashMap<IpAddr, Option<String>>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(answer)` when `ip` was resolved before, `None` when it was not.
    pub fn get(&self, ip: &IpAddr) -> Option<Option<String>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ip)
            .cloned()
    }

    pub fn insert(&self, ip: IpAddr, country: Option<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip, country);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consults a [`GeoCache`] before delegating to an inner resolver.
pub struct CachingGeoResolver {
    inner: Arc<dyn GeoResolver>,
    cache: Arc<GeoCache>,
}

impl CachingGeoResolver {
    pub fn new(inner: Arc<dyn GeoResolver>, cache: Arc<GeoCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<GeoCache> {
        &self.cache
    }
}

#[async_trait]
impl GeoResolver for CachingGeoResolver {
    async fn country_for_ip(&self, ip: IpAddr) -> Option<String> {
        if let Some(cached) = self.cache.get(&ip) {
            return cached;
        }
        let country = self.inner.country_for_ip(ip).await;
        self.cache.insert(ip, country.clone());
        country
    }
}
