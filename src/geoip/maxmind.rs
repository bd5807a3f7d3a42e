//! Offline lookups against a GeoLite2 database.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use maxminddb::Reader;

use super::{normalize_country_code, GeoResolver};
use crate::error_handling::InitializationError;

/// Resolves countries from a local `.mmdb` file (Country or City edition).
pub struct MaxMindGeoResolver {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoResolver {
    /// Loads the whole database into memory.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::GeoIpError` if the file cannot be read or
    /// is not a MaxMind database.
    pub async fn open(path: &Path) -> Result<Self, InitializationError> {
        log::info!("Loading GeoIP database from: {}", path.display());
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            InitializationError::GeoIpError(format!("failed to read {}: {e}", path.display()))
        })?;
        let reader = Reader::from_source(bytes).map_err(|e| {
            InitializationError::GeoIpError(format!("failed to parse {}: {e}", path.display()))
        })?;
        log::info!(
            "GeoIP database loaded: {} (built {})",
            reader.metadata.database_type,
            reader.metadata.build_epoch
        );
        Ok(Self { reader })
    }

    fn lookup(&self, ip: IpAddr) -> Option<String> {
        let lookup = self.reader.lookup(ip).ok()?;
        if !lookup.has_data() {
            return None;
        }
        // City records are a superset of Country records, so the Country
        // shape decodes from either edition.
        let record: maxminddb::geoip2::Country = lookup.decode().ok()??;
        record.country.iso_code.and_then(normalize_country_code)
    }
}

#[async_trait]
impl GeoResolver for MaxMindGeoResolver {
    async fn country_for_ip(&self, ip: IpAddr) -> Option<String> {
        self.lookup(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let result = MaxMindGeoResolver::open(Path::new("/nonexistent/GeoLite2-Country.mmdb")).await;
        assert!(matches!(result, Err(InitializationError::GeoIpError(_))));
    }

    #[tokio::test]
    async fn test_open_garbage_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a maxmind database").unwrap();
        let result = MaxMindGeoResolver::open(file.path()).await;
        assert!(matches!(result, Err(InitializationError::GeoIpError(_))));
    }
}
