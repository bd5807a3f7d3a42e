//! Error type definitions.
//!
//! This module defines the library error enums and the failure categories
//! counted during a pipeline cycle.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error opening the local GeoIP database.
    #[error("GeoIP database error: {0}")]
    GeoIpError(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Failure of a single resilient fetch.
///
/// Callers treat every variant as "this item could not be fetched this cycle".
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network-level failure (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[from] ReqwestError),

    /// Server-side 5xx response.
    #[error("server error: HTTP {0}")]
    ServerError(u16),

    /// The provider's quota resets further in the future than we are willing to wait.
    #[error("quota exhausted, reset in {wait_secs}s exceeds the wait cap")]
    QuotaWaitExceeded { wait_secs: u64 },

    /// The provider kept reporting an exhausted quota after repeated suspensions.
    #[error("quota still exhausted after {suspensions} suspensions")]
    QuotaStillExhausted { suspensions: u32 },

    /// The provider rejected the request with a non-retriable status.
    #[error("request rejected: HTTP {0}")]
    Rejected(u16),

    /// All attempts failed with transient errors.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    /// The request could not be cloned for a retry (streaming body).
    #[error("request cannot be retried")]
    NotRetryable,
}

impl FetchError {
    /// Returns true for failures that a later attempt may not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::ServerError(_))
    }
}

/// Failure categories tracked per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    /// A collector panicked or returned nothing because of an internal error
    CollectorFailed,
    /// A fetch failed after all retry attempts
    FetchRetriesExhausted,
    /// A fetch gave up because the provider quota stayed exhausted
    FetchQuotaExhausted,
    /// A fetch was answered with a non-retriable client error
    FetchRejected,
    /// A validation task panicked; its candidate was recorded dead
    ValidationTaskFailed,
    /// A geo lookup produced no country
    GeoLookupMiss,
    /// The batch upsert failed and was rolled back
    PersistenceFailed,
    /// An expiry purge failed
    PurgeFailed,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::CollectorFailed => "Collector failed",
            ErrorType::FetchRetriesExhausted => "Fetch retries exhausted",
            ErrorType::FetchQuotaExhausted => "Fetch quota exhausted",
            ErrorType::FetchRejected => "Fetch rejected (client error)",
            ErrorType::ValidationTaskFailed => "Validation task failed",
            ErrorType::GeoLookupMiss => "Geo lookup miss",
            ErrorType::PersistenceFailed => "Persistence failed",
            ErrorType::PurgeFailed => "Purge failed",
        }
    }
}
