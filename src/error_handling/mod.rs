//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions for initialization, database and fetch failures
//! - Per-category failure counters for a pipeline cycle
//!
//! None of the counted failures abort a cycle; they degrade its output and
//! are reported in the cycle summary.

mod stats;
mod types;

// Re-export public API
pub use stats::ProcessingStats;
pub use types::{DatabaseError, ErrorType, FetchError, InitializationError};
