//! HTTP client initialization.
//!
//! Collectors and geo lookups share one direct client. Proxy probes build a
//! dedicated client per candidate because reqwest binds the proxy at build time.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{ClientBuilder, Proxy};

/// Initializes the shared direct HTTP client.
///
/// # Arguments
///
/// * `timeout` - Per-request timeout
/// * `user_agent` - Value of the `User-Agent` header
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_client(timeout: Duration, user_agent: &str) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent.to_string())
        .build()?;
    Ok(Arc::new(client))
}

/// Initializes a client that routes every request through `proxy_url`.
///
/// `proxy_url` is a full proxy URL such as `socks5h://1.2.3.4:1080`.
/// Redirects are disabled so a verification answer always comes from the
/// endpoint itself.
///
/// # Errors
///
/// Returns a `reqwest::Error` if the proxy URL is rejected or the client
/// cannot be built.
pub fn init_proxied_client(proxy_url: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    ClientBuilder::new()
        .proxy(Proxy::all(proxy_url)?)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}
