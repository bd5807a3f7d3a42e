//! Resilient outbound HTTP.
//!
//! Every component that talks to an external HTTP endpoint goes through a
//! [`ResilientFetcher`]. A fetch never returns an error past its caller: it
//! yields a [`FetchOutcome`] and the caller decides what "no result" means for
//! its item.
//!
//! Failure handling:
//! - connection failures, timeouts and 5xx responses are retried with
//!   exponential backoff up to the policy's attempt budget
//! - a quota-exhausted response suspends the provider until its reset time
//!   and is retried without using an attempt
//! - any other non-success status is returned as "no result" at once

mod policy;
mod throttler;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_retry::RetryIf;

pub use policy::{quota_wait, RetryPolicy};
pub use throttler::ProviderLimiter;

use crate::error_handling::{ErrorType, FetchError, ProcessingStats};

/// Successful (2xx) response with its body read to a string.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub body: String,
}

impl FetchedResponse {
    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Result of one resilient fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchedResponse),
    /// The provider answered but the request cannot succeed now: a client
    /// error status, or a quota reset beyond the wait cap.
    NoResult(FetchError),
    /// Transient failures outlasted the retry budget.
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<FetchedResponse> {
        match self {
            FetchOutcome::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// What a single attempt observed, before retry classification.
enum Attempt {
    Response(FetchedResponse),
    Quota(std::time::Duration),
    Rejected(u16),
}

/// Retry/backoff wrapper around a `reqwest::Client`.
///
/// Cloning is cheap; clones share the client, limiter and stats.
#[derive(Clone)]
pub struct ResilientFetcher {
    client: Arc<reqwest::Client>,
    policy: RetryPolicy,
    limiter: Option<Arc<ProviderLimiter>>,
    stats: Arc<ProcessingStats>,
}

impl ResilientFetcher {
    pub fn new(client: Arc<reqwest::Client>, policy: RetryPolicy, stats: Arc<ProcessingStats>) -> Self {
        Self {
            client,
            policy,
            limiter: None,
            stats,
        }
    }

    /// Routes every call through `limiter`, so concurrent calls to the same
    /// provider are capped and quota suspensions are shared.
    pub fn with_limiter(mut self, limiter: Arc<ProviderLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Builds and sends a plain GET.
    pub async fn get(&self, url: &str) -> FetchOutcome {
        match self.client.get(url).build() {
            Ok(request) => self.fetch(request).await,
            Err(e) => {
                log::debug!("Invalid request for {url}: {e}");
                self.stats.increment_error(ErrorType::FetchRejected);
                FetchOutcome::NoResult(FetchError::Transport(e))
            }
        }
    }

    /// Sends `request` under the retry policy.
    ///
    /// # Arguments
    ///
    /// * `request` - A fully built request; its body must be cloneable
    ///
    /// # Returns
    ///
    /// `Success` for a 2xx response, `NoResult` for a client error or an
    /// over-long quota wait, `Failed` when the retry budget ran out.
    pub async fn fetch(&self, request: reqwest::Request) -> FetchOutcome {
        let url = request.url().to_string();
        let mut suspensions = 0u32;

        loop {
            match self.attempt_with_retries(&request).await {
                Ok(Attempt::Response(response)) => return FetchOutcome::Success(response),
                Ok(Attempt::Rejected(status)) => {
                    log::debug!("{url} rejected with HTTP {status}");
                    self.stats.increment_error(ErrorType::FetchRejected);
                    return FetchOutcome::NoResult(FetchError::Rejected(status));
                }
                Ok(Attempt::Quota(wait)) => {
                    if wait > self.policy.max_quota_wait {
                        log::warn!(
                            "Quota for {url} resets in {}s, over the {}s cap; skipping",
                            wait.as_secs(),
                            self.policy.max_quota_wait.as_secs()
                        );
                        self.stats.increment_error(ErrorType::FetchQuotaExhausted);
                        return FetchOutcome::NoResult(FetchError::QuotaWaitExceeded {
                            wait_secs: wait.as_secs(),
                        });
                    }
                    if suspensions >= self.policy.max_quota_suspensions {
                        self.stats.increment_error(ErrorType::FetchQuotaExhausted);
                        return FetchOutcome::NoResult(FetchError::QuotaStillExhausted { suspensions });
                    }
                    suspensions += 1;
                    if let Some(limiter) = &self.limiter {
                        limiter.pause_for(wait);
                    }
                    log::info!("Quota exhausted for {url}; waiting {}s", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_transient() => {
                    log::warn!("{url} failed after {} attempts: {e}", self.policy.max_attempts);
                    self.stats.increment_error(ErrorType::FetchRetriesExhausted);
                    return FetchOutcome::Failed(FetchError::RetriesExhausted {
                        attempts: self.policy.max_attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    self.stats.increment_error(ErrorType::FetchRetriesExhausted);
                    return FetchOutcome::Failed(e);
                }
            }
        }
    }

    /// Fetches `url` and returns the body of a 2xx answer.
    pub async fn get_text(&self, url: &str) -> Option<String> {
        self.get(url).await.into_response().map(|r| r.body)
    }

    /// Fetches `url` and parses a 2xx answer as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = self.get(url).await.into_response()?;
        match response.json() {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Unparsable JSON from {url}: {e}");
                None
            }
        }
    }

    /// Runs attempts until one is not transient or the schedule is exhausted.
    async fn attempt_with_retries(&self, request: &reqwest::Request) -> Result<Attempt, FetchError> {
        let client = self.client.as_ref();
        let limiter = self.limiter.as_deref();
        RetryIf::spawn(
            self.policy.backoff_schedule(),
            move || attempt_once(client, limiter, request),
            |e: &FetchError| e.is_transient(),
        )
        .await
    }
}

/// One attempt: wait for the provider, send, classify the status.
async fn attempt_once(
    client: &reqwest::Client,
    limiter: Option<&ProviderLimiter>,
    request: &reqwest::Request,
) -> Result<Attempt, FetchError> {
    let request = request.try_clone().ok_or(FetchError::NotRetryable)?;
    let _permit = match limiter {
        Some(limiter) => limiter.acquire().await,
        None => None,
    };

    let response = client.execute(request).await?;
    let status = response.status();
    if status.is_server_error() {
        log::debug!("{} answered HTTP {status}; will retry", response.url());
        return Err(FetchError::ServerError(status.as_u16()));
    }
    let now = chrono::Utc::now().timestamp();
    if let Some(wait) = quota_wait(status, response.headers(), now) {
        return Ok(Attempt::Quota(wait));
    }
    if !status.is_success() {
        return Ok(Attempt::Rejected(status.as_u16()));
    }
    let body = response.text().await?;
    Ok(Attempt::Response(FetchedResponse {
        status: status.as_u16(),
        body,
    }))
}
