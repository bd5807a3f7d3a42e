//! proxy_harvest library: harvests proxy endpoints from public text sources,
//! validates them and keeps scored results in SQLite.
//!
//! A pipeline cycle runs collectors, extracts endpoint candidates from every
//! document, checks liveness with bounded concurrency, resolves countries,
//! upserts the outcomes in one transaction and purges stale data.
//!
//! # Example
//!
//! ```no_run
//! use proxy_harvest::{build_pipeline, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     source_urls: vec!["https://example.com/proxies.txt".to_string()],
//!     validator_concurrency: 200,
//!     ..Default::default()
//! };
//!
//! let pipeline = build_pipeline(&config).await?;
//! let stats = pipeline.run_cycle().await;
//! println!("{} candidates, {} alive, {} saved", stats.candidates, stats.alive, stats.saved);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime.

pub mod collectors;
pub mod config;
pub mod error_handling;
pub mod fetch;
pub mod geoip;
pub mod initialization;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod validate;

// Re-export public API
pub use config::{Config, GithubConfig, LogFormat, LogLevel};
pub use normalize::{extract, EndpointCandidate, ProxyProtocol};
pub use pipeline::{build_pipeline, run_daemon, CycleSettings, Pipeline};
pub use storage::{CycleStats, ProxyRecord};
pub use validate::{ValidationOutcome, Validator};
