//! Cycle history.

use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;
use crate::storage::models::CycleStats;

const RUN_COLUMNS: &str = "started_at_ms, finished_at_ms, raw_sources, candidates, alive, saved, \
                           removed_dead, removed_observations, persist_failed, elapsed_seconds";

fn as_i64<T: TryInto<i64>>(v: T) -> i64 {
    v.try_into().unwrap_or(i64::MAX)
}

/// Appends one cycle's statistics.
pub async fn record_cycle(pool: &SqlitePool, stats: &CycleStats) -> Result<(), DatabaseError> {
    sqlx::query(&format!(
        "INSERT INTO pipeline_runs ({RUN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(stats.started_at_ms)
    .bind(stats.finished_at_ms)
    .bind(as_i64(stats.raw_sources))
    .bind(as_i64(stats.candidates))
    .bind(as_i64(stats.alive))
    .bind(as_i64(stats.saved))
    .bind(as_i64(stats.removed_dead))
    .bind(as_i64(stats.removed_observations))
    .bind(stats.persist_failed)
    .bind(stats.elapsed_seconds)
    .execute(pool)
    .await
    .map_err(DatabaseError::SqlError)?;
    Ok(())
}

/// Statistics of the most recent cycle, if any ran.
pub async fn last_cycle_stats(pool: &SqlitePool) -> Result<Option<CycleStats>, DatabaseError> {
    Ok(query_cycle_history(pool, Some(1)).await?.into_iter().next())
}

/// Recorded cycles, newest first.
pub async fn query_cycle_history(pool: &SqlitePool, limit: Option<usize>) -> Result<Vec<CycleStats>, DatabaseError> {
    let mut sql = format!("SELECT {RUN_COLUMNS} FROM pipeline_runs ORDER BY started_at_ms DESC, id DESC");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    rows.iter()
        .map(CycleStats::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::SqlError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::create_test_pool;

    fn stats(started_at_ms: i64, alive: usize) -> CycleStats {
        CycleStats {
            started_at_ms,
            finished_at_ms: started_at_ms + 1500,
            raw_sources: 3,
            candidates: 40,
            alive,
            saved: 40,
            removed_dead: 2,
            removed_observations: 7,
            persist_failed: false,
            elapsed_seconds: 1.5,
        }
    }

    #[tokio::test]
    async fn test_no_cycles_yet() {
        let pool = create_test_pool().await;
        assert!(last_cycle_stats(&pool).await.unwrap().is_none());
        assert!(query_cycle_history(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let pool = create_test_pool().await;
        record_cycle(&pool, &stats(1_000, 5)).await.unwrap();
        record_cycle(&pool, &stats(3_000, 9)).await.unwrap();
        record_cycle(&pool, &stats(2_000, 7)).await.unwrap();

        assert_eq!(last_cycle_stats(&pool).await.unwrap(), Some(stats(3_000, 9)));

        let history = query_cycle_history(&pool, Some(2)).await.unwrap();
        let started: Vec<_> = history.iter().map(|s| s.started_at_ms).collect();
        assert_eq!(started, vec![3_000, 2_000]);
        assert_eq!(query_cycle_history(&pool, None).await.unwrap().len(), 3);
    }
}
