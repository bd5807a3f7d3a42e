//! Shared helpers for storage tests.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::normalize::{EndpointCandidate, ProxyProtocol};
use crate::storage::{run_migrations, ResolvedOutcome};
use crate::validate::ValidationOutcome;

/// In-memory database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().expect("valid timestamp")
}

pub fn candidate(protocol: ProxyProtocol, host: &str, port: u16) -> EndpointCandidate {
    EndpointCandidate {
        protocol,
        host: host.to_string(),
        port,
        source: "test-source".to_string(),
    }
}

/// Outcome for `candidate` checked at `checked_at_ms`.
pub fn outcome(
    candidate: EndpointCandidate,
    latency_ms: Option<f64>,
    checked_at_ms: i64,
    country: Option<&str>,
) -> ResolvedOutcome {
    ResolvedOutcome {
        outcome: ValidationOutcome {
            candidate,
            alive: latency_ms.is_some(),
            latency_ms,
            checked_at: at_ms(checked_at_ms),
        },
        country: country.map(str::to_string),
    }
}
