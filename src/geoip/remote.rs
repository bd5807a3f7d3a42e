//! Remote country lookups over HTTP.

use std::net::IpAddr;

use async_trait::async_trait;

use super::{normalize_country_code, GeoResolver};
use crate::fetch::ResilientFetcher;

/// Asks a plain-text country API, e.g. `https://ipapi.co/{ip}/country/`.
///
/// The fetcher should carry its own provider limiter: these APIs throttle
/// aggressively.
pub struct RemoteGeoResolver {
    fetcher: ResilientFetcher,
    url_template: String,
}

impl RemoteGeoResolver {
    /// `url_template` must contain `{ip}`.
    pub fn new(fetcher: ResilientFetcher, url_template: impl Into<String>) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, ip: IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

#[async_trait]
impl GeoResolver for RemoteGeoResolver {
    async fn country_for_ip(&self, ip: IpAddr) -> Option<String> {
        let url = self.url_for(ip);
        let body = self.fetcher.get_text(&url).await?;
        let country = normalize_country_code(&body);
        if country.is_none() {
            log::debug!("No country for {ip}: {:?}", body.trim());
        }
        country
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::ProcessingStats;
    use crate::fetch::RetryPolicy;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver(server: &Server) -> RemoteGeoResolver {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let fetcher = ResilientFetcher::new(
            Arc::new(reqwest::Client::new()),
            policy,
            Arc::new(ProcessingStats::new()),
        );
        RemoteGeoResolver::new(fetcher, format!("http://{}/{{ip}}/country/", server.addr()))
    }

    #[tokio::test]
    async fn test_country_answer_is_normalized() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/8.8.8.8/country/"))
                .respond_with(status_code(200).body("us\n")),
        );
        let country = resolver(&server).country_for_ip("8.8.8.8".parse().unwrap()).await;
        assert_eq!(country.as_deref(), Some("US"));
    }

    #[tokio::test]
    async fn test_reserved_address_has_no_country() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/10.0.0.1/country/"))
                .respond_with(status_code(200).body("Undefined")),
        );
        let country = resolver(&server).country_for_ip("10.0.0.1".parse().unwrap()).await;
        assert_eq!(country, None);
    }

    #[tokio::test]
    async fn test_client_error_has_no_country() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/1.1.1.1/country/"))
                .times(1)
                .respond_with(status_code(400)),
        );
        let country = resolver(&server).country_for_ip("1.1.1.1".parse().unwrap()).await;
        assert_eq!(country, None);
    }
}
