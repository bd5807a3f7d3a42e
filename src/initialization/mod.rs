//! Shared resource initialization.
//!
//! This module provides functions to initialize the resources a pipeline
//! cycle shares between tasks:
//! - HTTP clients for collectors and geo lookups
//! - Logger
//! - Concurrency semaphores

mod client;
mod logger;

use std::sync::Arc;

use tokio::sync::Semaphore;

// Re-export public API
pub use client::{init_client, init_proxied_client};
pub use logger::init_logger_with;

/// Initializes a semaphore for controlling concurrency.
///
/// The validator uses one of these to bound the number of in-flight probes.
///
/// # Arguments
///
/// * `count` - Maximum number of concurrent operations allowed
///
/// # Returns
///
/// An `Arc<Semaphore>` that can be shared across multiple tasks.
pub fn init_semaphore(count: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(count))
}
