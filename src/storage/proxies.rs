//! Proxy records: scoring, batch upsert, expiry and ranked reads.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::SUCCESS_RATE_DECAY;
use crate::error_handling::DatabaseError;
use crate::normalize::EndpointKey;
use crate::storage::models::ProxyRecord;
use crate::storage::{cutoff_ms, now_ms};
use crate::validate::ValidationOutcome;

const PROXY_COLUMNS: &str = "protocol, host, port, source, country, alive, latency_ms, \
                             success_rate, score, last_checked_ms";

/// Latency at which the latency component of the score is halved.
const LATENCY_HALF_SCORE_MS: f64 = 1000.0;

/// A validation outcome with the country resolved for its host, if any.
#[derive(Debug, Clone)]
pub struct ResolvedOutcome {
    pub outcome: ValidationOutcome,
    pub country: Option<String>,
}

/// Blends one observation into the previous success rate.
pub fn next_success_rate(previous: f64, alive: bool) -> f64 {
    let observed = if alive { 1.0 } else { 0.0 };
    (previous * SUCCESS_RATE_DECAY + observed * (1.0 - SUCCESS_RATE_DECAY)).clamp(0.0, 1.0)
}

/// Composite score.
///
/// Alive records land in `(50, 100]`: a success-rate term worth up to 30 and
/// a latency term worth up to 20 that halves at one second. Dead records land
/// in `[0, 10]`, so any alive record outranks any dead one.
pub fn compute_score(alive: bool, latency_ms: Option<f64>, success_rate: f64) -> f64 {
    let success_rate = success_rate.clamp(0.0, 1.0);
    if !alive {
        return 10.0 * success_rate;
    }
    let latency = latency_ms.unwrap_or(0.0).max(0.0);
    50.0 + 30.0 * success_rate + 20.0 * LATENCY_HALF_SCORE_MS / (LATENCY_HALF_SCORE_MS + latency)
}

/// Persists a batch of outcomes in one transaction.
///
/// New keys start with a success rate of 1.0 or 0.0; known keys decay the
/// stored rate. The country is only overwritten by a known value. One
/// observation row is appended per outcome. Any error rolls back the whole
/// batch.
///
/// # Returns
///
/// The number of outcomes persisted.
pub async fn batch_upsert(pool: &SqlitePool, outcomes: &[ResolvedOutcome]) -> Result<usize, DatabaseError> {
    if outcomes.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.map_err(DatabaseError::SqlError)?;
    let written_at_ms = now_ms();

    for resolved in outcomes {
        let outcome = &resolved.outcome;
        let candidate = &outcome.candidate;
        let checked_at_ms = outcome.checked_at.timestamp_millis();

        let previous = sqlx::query("SELECT success_rate FROM proxies WHERE protocol = ? AND host = ? AND port = ?")
            .bind(candidate.protocol.as_ref())
            .bind(&candidate.host)
            .bind(i64::from(candidate.port))
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;

        let success_rate = match previous {
            Some(row) => next_success_rate(row.get::<f64, _>("success_rate"), outcome.alive),
            None if outcome.alive => 1.0,
            None => 0.0,
        };
        let score = compute_score(outcome.alive, outcome.latency_ms, success_rate);

        sqlx::query(
            "INSERT INTO proxies (
                protocol, host, port, source, country, alive, latency_ms,
                success_rate, score, last_checked_ms, created_at_ms, updated_at_ms
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(protocol, host, port) DO UPDATE SET
                source = excluded.source,
                country = COALESCE(excluded.country, proxies.country),
                alive = excluded.alive,
                latency_ms = excluded.latency_ms,
                success_rate = excluded.success_rate,
                score = excluded.score,
                last_checked_ms = excluded.last_checked_ms,
                updated_at_ms = excluded.updated_at_ms",
        )
        .bind(candidate.protocol.as_ref())
        .bind(&candidate.host)
        .bind(i64::from(candidate.port))
        .bind(&candidate.source)
        .bind(resolved.country.as_deref())
        .bind(outcome.alive)
        .bind(outcome.latency_ms)
        .bind(success_rate)
        .bind(score)
        .bind(checked_at_ms)
        .bind(written_at_ms)
        .bind(written_at_ms)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::SqlError)?;

        sqlx::query(
            "INSERT INTO observations (protocol, host, port, alive, latency_ms, source, checked_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(candidate.protocol.as_ref())
        .bind(&candidate.host)
        .bind(i64::from(candidate.port))
        .bind(outcome.alive)
        .bind(outcome.latency_ms)
        .bind(&candidate.source)
        .bind(checked_at_ms)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::SqlError)?;
    }

    tx.commit().await.map_err(DatabaseError::SqlError)?;
    log::debug!("Upserted {} proxy records", outcomes.len());
    Ok(outcomes.len())
}

/// Deletes dead records last checked more than `days` ago.
pub async fn purge_dead_older_than(pool: &SqlitePool, days: u32) -> Result<u64, DatabaseError> {
    purge_dead_before(pool, cutoff_ms(now_ms(), days)).await
}

/// Deletes dead records with `last_checked_ms` strictly before `cutoff_ms`.
pub async fn purge_dead_before(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64, DatabaseError> {
    let result = sqlx::query("DELETE FROM proxies WHERE alive = 0 AND last_checked_ms < ?")
        .bind(cutoff_ms)
        .execute(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    Ok(result.rows_affected())
}

/// Deletes observation rows older than `days`.
pub async fn purge_observations_older_than(pool: &SqlitePool, days: u32) -> Result<u64, DatabaseError> {
    purge_observations_before(pool, cutoff_ms(now_ms(), days)).await
}

pub async fn purge_observations_before(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64, DatabaseError> {
    let result = sqlx::query("DELETE FROM observations WHERE checked_at_ms < ?")
        .bind(cutoff_ms)
        .execute(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    Ok(result.rows_affected())
}

/// Alive records ordered by score, best first.
///
/// A non-empty `countries` restricts the result to those country codes
/// (case-insensitive).
pub async fn top_by_score(
    pool: &SqlitePool,
    limit: i64,
    countries: &[String],
) -> Result<Vec<ProxyRecord>, DatabaseError> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {PROXY_COLUMNS} FROM proxies WHERE alive = 1"));
    if !countries.is_empty() {
        query.push(" AND country IN (");
        let mut list = query.separated(", ");
        for country in countries {
            list.push_bind(country.trim().to_uppercase());
        }
        list.push_unseparated(")");
    }
    query.push(" ORDER BY score DESC, latency_ms ASC LIMIT ");
    query.push_bind(limit.max(0));

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    rows.iter()
        .map(ProxyRecord::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::SqlError)
}

/// Reads one record by key.
pub async fn get_proxy(pool: &SqlitePool, key: &EndpointKey) -> Result<Option<ProxyRecord>, DatabaseError> {
    let row = sqlx::query(&format!(
        "SELECT {PROXY_COLUMNS} FROM proxies WHERE protocol = ? AND host = ? AND port = ?"
    ))
    .bind(key.protocol.as_ref())
    .bind(&key.host)
    .bind(i64::from(key.port))
    .fetch_optional(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    row.as_ref()
        .map(ProxyRecord::from_row)
        .transpose()
        .map_err(DatabaseError::SqlError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ProxyProtocol;
    use crate::storage::test_helpers::{candidate, create_test_pool, outcome};

    const DAY: i64 = crate::config::MS_PER_DAY;
    const T0: i64 = 1_760_000_000_000;

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_success_rate_moves_toward_bounds() {
        let mut rate = 0.0;
        for _ in 0..50 {
            let next = next_success_rate(rate, true);
            assert!(next > rate && next <= 1.0);
            rate = next;
        }

        let mut rate = 1.0;
        for _ in 0..50 {
            let next = next_success_rate(rate, false);
            assert!(next < rate && next >= 0.0);
            rate = next;
        }

        assert_eq!(next_success_rate(1.0, true), 1.0);
        assert_eq!(next_success_rate(0.0, false), 0.0);
    }

    #[test]
    fn test_score_ordering() {
        // Equal success rate: lower latency wins.
        assert!(compute_score(true, Some(100.0), 0.7) > compute_score(true, Some(900.0), 0.7));
        // Equal latency: higher success rate wins.
        assert!(compute_score(true, Some(300.0), 0.9) > compute_score(true, Some(300.0), 0.5));
        // Worst alive outranks best dead.
        assert!(compute_score(true, Some(60_000.0), 0.0) > compute_score(false, None, 1.0));
        assert_eq!(compute_score(false, None, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_first_upsert_creates_record_and_observation() {
        let pool = create_test_pool().await;
        let batch = vec![
            outcome(candidate(ProxyProtocol::Http, "1.2.3.4", 8080), Some(120.0), T0, Some("DE")),
            outcome(candidate(ProxyProtocol::Socks5, "5.6.7.8", 1080), None, T0, None),
        ];

        assert_eq!(batch_upsert(&pool, &batch).await.unwrap(), 2);

        let alive = get_proxy(&pool, &batch[0].outcome.candidate.key()).await.unwrap().unwrap();
        assert!(alive.alive);
        assert_eq!(alive.success_rate, 1.0);
        assert_eq!(alive.country.as_deref(), Some("DE"));
        assert_eq!(alive.latency_ms, Some(120.0));
        assert_eq!(alive.last_checked.timestamp_millis(), T0);

        let dead = get_proxy(&pool, &batch[1].outcome.candidate.key()).await.unwrap().unwrap();
        assert!(!dead.alive);
        assert_eq!(dead.success_rate, 0.0);
        assert!(alive.score > dead.score);

        assert_eq!(count(&pool, "observations").await, 2);
    }

    #[tokio::test]
    async fn test_alive_then_dead_decays_between_bounds() {
        let pool = create_test_pool().await;
        let c = candidate(ProxyProtocol::Http, "1.2.3.4", 8080);

        batch_upsert(&pool, &[outcome(c.clone(), Some(50.0), T0, None)]).await.unwrap();
        batch_upsert(&pool, &[outcome(c.clone(), None, T0 + 60_000, None)]).await.unwrap();

        let record = get_proxy(&pool, &c.key()).await.unwrap().unwrap();
        assert!(record.success_rate > 0.0 && record.success_rate < 1.0);
        assert!((record.success_rate - 0.8).abs() < 1e-9);
        assert!(!record.alive);
        assert_eq!(record.latency_ms, None);
        assert_eq!(count(&pool, "proxies").await, 1);
        assert_eq!(count(&pool, "observations").await, 2);
    }

    #[tokio::test]
    async fn test_country_only_overwritten_by_known_value() {
        let pool = create_test_pool().await;
        let c = candidate(ProxyProtocol::Socks4, "9.9.9.9", 4145);

        batch_upsert(&pool, &[outcome(c.clone(), Some(10.0), T0, Some("DE"))]).await.unwrap();
        batch_upsert(&pool, &[outcome(c.clone(), Some(10.0), T0 + 1, None)]).await.unwrap();
        let record = get_proxy(&pool, &c.key()).await.unwrap().unwrap();
        assert_eq!(record.country.as_deref(), Some("DE"));

        batch_upsert(&pool, &[outcome(c.clone(), Some(10.0), T0 + 2, Some("FR"))]).await.unwrap();
        let record = get_proxy(&pool, &c.key()).await.unwrap().unwrap();
        assert_eq!(record.country.as_deref(), Some("FR"));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back_entirely() {
        let pool = create_test_pool().await;
        let batch = vec![
            outcome(candidate(ProxyProtocol::Http, "1.1.1.1", 80), Some(5.0), T0, None),
            // Port 0 violates the schema's port range check.
            outcome(candidate(ProxyProtocol::Http, "2.2.2.2", 0), Some(5.0), T0, None),
        ];

        assert!(batch_upsert(&pool, &batch).await.is_err());
        assert_eq!(count(&pool, "proxies").await, 0);
        assert_eq!(count(&pool, "observations").await, 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let pool = create_test_pool().await;
        assert_eq!(batch_upsert(&pool, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_dead_is_strict_and_spares_alive() {
        let pool = create_test_pool().await;
        let cutoff = T0;
        let old_dead = candidate(ProxyProtocol::Http, "1.0.0.1", 80);
        let edge_dead = candidate(ProxyProtocol::Http, "1.0.0.2", 80);
        let fresh_dead = candidate(ProxyProtocol::Http, "1.0.0.3", 80);
        let old_alive = candidate(ProxyProtocol::Http, "1.0.0.4", 80);

        batch_upsert(
            &pool,
            &[
                outcome(old_dead.clone(), None, cutoff - DAY, None),
                outcome(edge_dead.clone(), None, cutoff, None),
                outcome(fresh_dead.clone(), None, cutoff + DAY, None),
                outcome(old_alive.clone(), Some(30.0), cutoff - 10 * DAY, None),
            ],
        )
        .await
        .unwrap();

        assert_eq!(purge_dead_before(&pool, cutoff).await.unwrap(), 1);
        assert!(get_proxy(&pool, &old_dead.key()).await.unwrap().is_none());
        assert!(get_proxy(&pool, &edge_dead.key()).await.unwrap().is_some());
        assert!(get_proxy(&pool, &fresh_dead.key()).await.unwrap().is_some());
        assert!(get_proxy(&pool, &old_alive.key()).await.unwrap().is_some());

        // Observation history is an independent horizon.
        assert_eq!(count(&pool, "observations").await, 4);
    }

    #[tokio::test]
    async fn test_purge_observations_by_age() {
        let pool = create_test_pool().await;
        let c = candidate(ProxyProtocol::Http, "1.2.3.4", 80);
        for day in 0..5 {
            batch_upsert(&pool, &[outcome(c.clone(), Some(1.0), T0 + day * DAY, None)])
                .await
                .unwrap();
        }

        assert_eq!(purge_observations_before(&pool, T0 + 2 * DAY).await.unwrap(), 2);
        assert_eq!(count(&pool, "observations").await, 3);
        assert!(get_proxy(&pool, &c.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_by_days_uses_current_time() {
        let pool = create_test_pool().await;
        let now = now_ms();
        let stale = candidate(ProxyProtocol::MtProto, "3.3.3.3", 443);
        let recent = candidate(ProxyProtocol::MtProto, "4.4.4.4", 443);
        batch_upsert(
            &pool,
            &[
                outcome(stale.clone(), None, now - 4 * DAY, None),
                outcome(recent.clone(), None, now - DAY, None),
            ],
        )
        .await
        .unwrap();

        assert_eq!(purge_dead_older_than(&pool, 3).await.unwrap(), 1);
        assert_eq!(purge_observations_older_than(&pool, 2).await.unwrap(), 1);
        assert!(get_proxy(&pool, &recent.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_top_by_score_orders_and_filters() {
        let pool = create_test_pool().await;
        batch_upsert(
            &pool,
            &[
                outcome(candidate(ProxyProtocol::Http, "1.1.1.1", 80), Some(800.0), T0, Some("US")),
                outcome(candidate(ProxyProtocol::Http, "2.2.2.2", 80), Some(20.0), T0, Some("DE")),
                outcome(candidate(ProxyProtocol::Socks5, "3.3.3.3", 1080), Some(200.0), T0, Some("FR")),
                outcome(candidate(ProxyProtocol::Http, "4.4.4.4", 80), None, T0, Some("DE")),
            ],
        )
        .await
        .unwrap();

        let top = top_by_score(&pool, 10, &[]).await.unwrap();
        let hosts: Vec<_> = top.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["2.2.2.2", "3.3.3.3", "1.1.1.1"]);
        assert_eq!(top[1].protocol, ProxyProtocol::Socks5);
        assert_eq!(top[1].url(), "socks5://3.3.3.3:1080");

        let limited = top_by_score(&pool, 1, &[]).await.unwrap();
        assert_eq!(limited.len(), 1);

        let filtered = top_by_score(&pool, 10, &["de".to_string(), "US".to_string()])
            .await
            .unwrap();
        let hosts: Vec<_> = filtered.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["2.2.2.2", "1.1.1.1"]);
    }
}
