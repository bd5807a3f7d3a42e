//! Aggregate read model for the `stats` command.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::MS_PER_DAY;
use crate::error_handling::DatabaseError;
use crate::storage::models::CycleStats;
use crate::storage::queue::{queue_stats, QueueStats};
use crate::storage::runs::last_cycle_stats;

const TOP_COUNTRIES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub alive: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_proxies: i64,
    pub alive_proxies: i64,
    /// Most common countries among alive records
    pub top_countries: Vec<CountryCount>,
    pub queue: QueueStats,
    pub last_cycle: Option<CycleStats>,
    pub observations_24h: i64,
}

/// Collects the dashboard figures as of `now_ms`.
pub async fn dashboard_stats(pool: &SqlitePool, now_ms: i64) -> Result<DashboardStats, DatabaseError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN alive = 1 THEN 1 ELSE 0 END), 0) AS alive
         FROM proxies",
    )
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::SqlError)?;
    let total_proxies: i64 = row.get("total");
    let alive_proxies: i64 = row.get("alive");

    let top_countries: Vec<CountryCount> = sqlx::query(
        "SELECT country, COUNT(*) AS n FROM proxies
         WHERE alive = 1 AND country IS NOT NULL
         GROUP BY country ORDER BY n DESC, country ASC LIMIT ?",
    )
    .bind(TOP_COUNTRIES)
    .fetch_all(pool)
    .await
    .map_err(DatabaseError::SqlError)?
    .iter()
    .map(|row| CountryCount {
        country: row.get("country"),
        alive: row.get("n"),
    })
    .collect();

    let observations_24h: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM observations WHERE checked_at_ms >= ?")
        .bind(now_ms - MS_PER_DAY)
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::SqlError)?;

    Ok(DashboardStats {
        total_proxies,
        alive_proxies,
        top_countries,
        queue: queue_stats(pool).await?,
        last_cycle: last_cycle_stats(pool).await?,
        observations_24h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ProxyProtocol;
    use crate::storage::test_helpers::{candidate, create_test_pool, outcome};
    use crate::storage::{batch_upsert, enqueue_repo_at};

    const NOW: i64 = 1_760_000_000_000;

    #[tokio::test]
    async fn test_empty_database() {
        let pool = create_test_pool().await;
        let stats = dashboard_stats(&pool, NOW).await.unwrap();
        assert_eq!(stats.total_proxies, 0);
        assert_eq!(stats.alive_proxies, 0);
        assert!(stats.top_countries.is_empty());
        assert!(stats.last_cycle.is_none());
    }

    #[tokio::test]
    async fn test_counts() {
        let pool = create_test_pool().await;
        batch_upsert(
            &pool,
            &[
                outcome(candidate(ProxyProtocol::Http, "1.1.1.1", 80), Some(10.0), NOW - 1000, Some("DE")),
                outcome(candidate(ProxyProtocol::Http, "2.2.2.2", 80), Some(10.0), NOW - 1000, Some("DE")),
                outcome(candidate(ProxyProtocol::Http, "3.3.3.3", 80), Some(10.0), NOW - 1000, Some("US")),
                outcome(candidate(ProxyProtocol::Http, "4.4.4.4", 80), None, NOW - 2 * MS_PER_DAY, Some("FR")),
            ],
        )
        .await
        .unwrap();
        enqueue_repo_at(&pool, "a/b", None, false, chrono::Duration::days(7), NOW)
            .await
            .unwrap();

        let stats = dashboard_stats(&pool, NOW).await.unwrap();
        assert_eq!(stats.total_proxies, 4);
        assert_eq!(stats.alive_proxies, 3);
        assert_eq!(
            stats.top_countries,
            vec![
                CountryCount { country: "DE".to_string(), alive: 2 },
                CountryCount { country: "US".to_string(), alive: 1 },
            ]
        );
        assert_eq!(stats.queue.pending, 1);
        assert_eq!(stats.observations_24h, 3);
    }
}
