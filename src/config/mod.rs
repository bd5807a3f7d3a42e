//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, limits, retention horizons, etc.)
//! - The library `Config` struct and logging option types

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, GithubConfig, LogFormat, LogLevel};
