//! GitHub code and repository harvesting.
//!
//! One collection pass:
//! 1. code search per query, keeping files whose path looks proxy-related
//! 2. repository search per query
//! 3. pending repositories from the task queue
//! 4. deep scan of every repository from 2 and 3: README plus matching tree
//!    blobs
//! 5. queued repositories are marked complete after their deep scan
//!
//! All calls share one [`ResilientFetcher`]; give it the GitHub provider
//! limiter so quota exhaustion pauses every caller.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};

use super::{Collector, RawDocument};
use crate::config::{GithubConfig, GITHUB_MAX_BLOBS_PER_REPO, GITHUB_MAX_FILES_PER_QUERY, GITHUB_QUEUE_BATCH};
use crate::fetch::ResilientFetcher;
use crate::storage::{complete_repo, pending_repos};

const API_VERSION: &str = "2022-11-28";

static TEXT_EXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(txt|conf|cfg|ini|yaml|yml|json|csv|list|md)$").expect("invalid regex")
});

static PROXYISH_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(proxy|socks|mtproto|shadow|v2ray|trojan|vpn|ss)").expect("invalid regex")
});

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CodeItem {
    #[serde(default)]
    path: String,
    url: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoItem {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoMeta {
    default_branch: Option<String>,
}

/// File, README and blob payloads all carry base64 `content`.
#[derive(Debug, Deserialize)]
struct EncodedContent {
    #[serde(default)]
    content: String,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tree {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    size: u64,
    sha: Option<String>,
}

/// Decodes GitHub's line-wrapped base64 `content` field.
fn decode_content(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(compact).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Documents of one pass, unique by source.
#[derive(Default)]
struct Harvest {
    seen: HashSet<String>,
    docs: Vec<RawDocument>,
}

impl Harvest {
    fn contains(&self, source: &str) -> bool {
        self.seen.contains(source)
    }

    fn push(&mut self, source: String, text: String) -> bool {
        if !self.seen.insert(source.clone()) {
            return false;
        }
        self.docs.push(RawDocument { source, text });
        true
    }
}

pub struct GithubCollector {
    fetcher: ResilientFetcher,
    config: GithubConfig,
    queue: Option<Arc<Pool<Sqlite>>>,
    concurrency: usize,
}

impl GithubCollector {
    /// `concurrency` bounds blob downloads within one repository.
    pub fn new(fetcher: ResilientFetcher, config: GithubConfig, concurrency: usize) -> Self {
        Self {
            fetcher,
            config,
            queue: None,
            concurrency: concurrency.max(1),
        }
    }

    /// Also deep-scans the pending repositories of the task queue and marks
    /// them complete.
    pub fn with_queue(mut self, pool: Arc<Pool<Sqlite>>) -> Self {
        self.queue = Some(pool);
        self
    }

    fn api(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn per_page(&self) -> u32 {
        self.config.per_page.clamp(1, 100)
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, url: &str, query: &[(&str, String)]) -> Option<T> {
        let request = self
            .fetcher
            .client()
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .build();
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Invalid GitHub request {url}: {e}");
                return None;
            }
        };

        let response = self.fetcher.fetch(request).await.into_response()?;
        match response.json() {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Unparsable GitHub answer from {url}: {e}");
                None
            }
        }
    }

    async fn code_search(&self, token: &str, harvest: &mut Harvest) {
        for query in &self.config.queries {
            let mut accepted = 0usize;
            'pages: for page in 1..=self.config.code_pages {
                let params = [
                    ("q", format!("{query} in:file")),
                    ("per_page", self.per_page().to_string()),
                    ("page", page.to_string()),
                ];
                let Some(result) = self
                    .get_json::<SearchPage<CodeItem>>(token, &self.api("/search/code"), &params)
                    .await
                else {
                    break;
                };
                if result.items.is_empty() {
                    break;
                }

                for item in result.items {
                    if !item.path.is_empty() && !PROXYISH_PATH_RE.is_match(&item.path) {
                        continue;
                    }
                    let Some(url) = item.url else { continue };
                    let source = item.html_url.unwrap_or_else(|| url.clone());
                    if harvest.contains(&source) {
                        continue;
                    }
                    let Some(file) = self.get_json::<EncodedContent>(token, &url, &[]).await else {
                        continue;
                    };
                    let Some(text) = decode_content(&file.content) else { continue };
                    if harvest.push(source, text) {
                        accepted += 1;
                        if accepted >= GITHUB_MAX_FILES_PER_QUERY {
                            break 'pages;
                        }
                    }
                }
            }
            log::info!("GitHub code search {query:?}: {accepted} files");
        }
    }

    async fn discover_repos(&self, token: &str) -> BTreeSet<String> {
        let mut repos = BTreeSet::new();
        for query in &self.config.queries {
            for page in 1..=self.config.repo_pages {
                let params = [
                    ("q", format!("{query} proxy socks mtproto shadowsocks in:readme,description")),
                    ("sort", "updated".to_string()),
                    ("order", "desc".to_string()),
                    ("per_page", self.per_page().to_string()),
                    ("page", page.to_string()),
                ];
                let Some(result) = self
                    .get_json::<SearchPage<RepoItem>>(token, &self.api("/search/repositories"), &params)
                    .await
                else {
                    break;
                };
                if result.items.is_empty() {
                    break;
                }
                repos.extend(
                    result
                        .items
                        .into_iter()
                        .filter_map(|item| item.full_name)
                        .map(|name| name.to_lowercase()),
                );
            }
        }
        repos
    }

    async fn queued_repos(&self) -> Vec<String> {
        let Some(pool) = &self.queue else {
            return Vec::new();
        };
        match pending_repos(pool, GITHUB_QUEUE_BATCH).await {
            Ok(tasks) => tasks.into_iter().map(|t| t.repo_id).collect(),
            Err(e) => {
                log::warn!("Cannot read the repository queue: {e}");
                Vec::new()
            }
        }
    }

    async fn scan_repo(&self, token: &str, repo: &str, harvest: &mut Harvest) {
        let Some(meta) = self
            .get_json::<RepoMeta>(token, &self.api(&format!("/repos/{repo}")), &[])
            .await
        else {
            log::debug!("Repository {repo} unavailable");
            return;
        };
        let branch = meta.default_branch.unwrap_or_else(|| "main".to_string());

        if let Some(readme) = self
            .get_json::<EncodedContent>(token, &self.api(&format!("/repos/{repo}/readme")), &[])
            .await
        {
            if let Some(text) = decode_content(&readme.content) {
                harvest.push(format!("https://github.com/{repo}#readme"), text);
            }
        }

        let Some(tree) = self
            .get_json::<Tree>(
                token,
                &self.api(&format!("/repos/{repo}/git/trees/{branch}")),
                &[("recursive", "1".to_string())],
            )
            .await
        else {
            return;
        };

        let blobs: Vec<(String, String)> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && e.size <= self.config.max_blob_bytes)
            .filter(|e| TEXT_EXT_RE.is_match(&e.path) || PROXYISH_PATH_RE.is_match(&e.path))
            .filter_map(|e| Some((e.sha?, e.path)))
            .map(|(sha, path)| (sha, format!("https://github.com/{repo}/blob/{branch}/{path}")))
            .filter(|(_, source)| !harvest.contains(source))
            .take(GITHUB_MAX_BLOBS_PER_REPO)
            .collect();

        let fetched: Vec<(String, Option<String>)> = stream::iter(blobs)
            .map(|(sha, source)| async move {
                let url = self.api(&format!("/repos/{repo}/git/blobs/{sha}"));
                let text = self
                    .get_json::<EncodedContent>(token, &url, &[])
                    .await
                    .filter(|blob| blob.encoding.as_deref() == Some("base64"))
                    .and_then(|blob| decode_content(&blob.content));
                (source, text)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (source, text) in fetched {
            if let Some(text) = text {
                harvest.push(source, text);
            }
        }
    }
}

#[async_trait]
impl Collector for GithubCollector {
    fn name(&self) -> &str {
        "github"
    }

    async fn collect(&self) -> Vec<RawDocument> {
        let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) else {
            log::warn!("No GitHub token configured; GitHub collector disabled");
            return Vec::new();
        };

        let mut harvest = Harvest::default();
        self.code_search(token, &mut harvest).await;

        let mut repos = self.discover_repos(token).await;
        let queued = self.queued_repos().await;
        repos.extend(queued.iter().cloned());
        log::info!("GitHub deep scan of {} repositories ({} queued)", repos.len(), queued.len());

        for repo in &repos {
            self.scan_repo(token, repo, &mut harvest).await;
        }

        if let Some(pool) = &self.queue {
            for repo in &queued {
                if let Err(e) = complete_repo(pool, repo, None).await {
                    log::warn!("Cannot mark {repo} as analyzed: {e}");
                }
            }
        }

        log::info!("GitHub collector finished: {} documents", harvest.docs.len());
        harvest.docs
    }
}
