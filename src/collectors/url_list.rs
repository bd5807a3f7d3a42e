//! Plain URL sources.

use async_trait::async_trait;
use futures::future::join_all;

use super::{Collector, RawDocument};
use crate::fetch::ResilientFetcher;

/// Fetches a fixed list of URLs; every non-empty 2xx body is a document.
pub struct UrlListCollector {
    fetcher: ResilientFetcher,
    urls: Vec<String>,
}

impl UrlListCollector {
    /// Keeps only well-formed `http`/`https` URLs; the rest are skipped with
    /// a warning.
    pub fn new(fetcher: ResilientFetcher, urls: Vec<String>) -> Self {
        let urls = urls.iter().filter_map(|u| validate_source_url(u)).collect();
        Self { fetcher, urls }
    }
}

/// Trims `raw` and checks syntax and scheme. Scheme-less input gets `https://`.
fn validate_source_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    match url::Url::parse(&normalized) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => Some(normalized),
        Ok(_) => {
            log::warn!("Skipping source with unsupported scheme: {raw}");
            None
        }
        Err(e) => {
            log::warn!("Skipping invalid source URL {raw}: {e}");
            None
        }
    }
}

#[async_trait]
impl Collector for UrlListCollector {
    fn name(&self) -> &str {
        "url_list"
    }

    async fn collect(&self) -> Vec<RawDocument> {
        if self.urls.is_empty() {
            return Vec::new();
        }

        let bodies = join_all(self.urls.iter().map(|url| self.fetcher.get_text(url))).await;
        let docs: Vec<RawDocument> = self
            .urls
            .iter()
            .zip(bodies)
            .filter_map(|(url, body)| match body {
                Some(text) if !text.trim().is_empty() => Some(RawDocument::new(url.as_str(), text)),
                _ => {
                    log::debug!("No usable body from {url}");
                    None
                }
            })
            .collect();

        log::info!("URL list collector: {}/{} sources fetched", docs.len(), self.urls.len());
        docs
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use httptest::{matchers::*, responders::*, Expectation, Server};

    use super::*;
    use crate::error_handling::ProcessingStats;
    use crate::fetch::RetryPolicy;

    fn fetcher() -> ResilientFetcher {
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

    #[tokio::test]
    async fn test_keeps_successful_non_empty_bodies() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/good.txt"))
                .respond_with(status_code(200).body("1.2.3.4:8080\n")),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/empty.txt"))
                .respond_with(status_code(200).body("  \n")),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/gone.txt"))
                .respond_with(status_code(404)),
        );

        let base = format!("http://{}", server.addr());
        let collector = UrlListCollector::new(
            fetcher(),
            vec![
                format!("{base}/good.txt"),
                format!("{base}/empty.txt"),
                format!("{base}/gone.txt"),
            ],
        );

        let docs = collector.collect().await;
        assert_eq!(docs, vec![RawDocument::new(format!("{base}/good.txt"), "1.2.3.4:8080\n")]);
    }

    #[test]
    fn test_source_url_validation() {
        assert_eq!(
            validate_source_url(" raw.githubusercontent.com/a/b/main/list.txt "),
            Some("https://raw.githubusercontent.com/a/b/main/list.txt".to_string())
        );
        assert_eq!(
            validate_source_url("http://127.0.0.1:8000/x"),
            Some("http://127.0.0.1:8000/x".to_string())
        );
        assert_eq!(validate_source_url("ftp://example.com/list.txt"), None);
        assert_eq!(validate_source_url("http://"), None);
        assert_eq!(validate_source_url("   "), None);
    }

    #[tokio::test]
    async fn test_no_urls_no_documents() {
        let collector = UrlListCollector::new(fetcher(), Vec::new());
        assert!(collector.collect().await.is_empty());
        assert_eq!(collector.name(), "url_list");
    }
}
