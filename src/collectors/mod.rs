//! Raw-text sources.
//!
//! A [`Collector`] returns whole documents; it never fails past its boundary.
//! Anything it cannot fetch this cycle is logged and left out.

mod github;
mod url_list;

use async_trait::async_trait;
use serde::Serialize;

pub use github::GithubCollector;
pub use url_list::UrlListCollector;

/// One document and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDocument {
    /// Stable identifier of the document, usually its URL
    pub source: String,
    pub text: String,
}

impl RawDocument {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    /// Short name used in logs and error counts.
    fn name(&self) -> &str;

    async fn collect(&self) -> Vec<RawDocument>;
}
