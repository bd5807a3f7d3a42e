//! Repository task queue.
//!
//! Repositories move `pending -> done` when a deep scan finishes and may
//! return to `pending` once the re-scan threshold has passed since their last
//! analysis, or when forced. Identifiers are case-insensitive and stored
//! lowercase.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use strum_macros::{AsRefStr, Display};

use crate::error_handling::DatabaseError;
use crate::storage::models::{RepoStatus, RepoTask};
use crate::storage::now_ms;

static REPO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)").expect("invalid regex")
});

static REPO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("invalid regex"));

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnqueueResult {
    /// New row created in `pending`
    Queued,
    /// Already `pending`; nothing changed
    AlreadyQueued,
    /// Moved from `done` back to `pending`
    Requeued,
    /// `done` and still within the re-scan threshold; nothing changed
    AlreadyAnalyzed,
}

/// Number of tasks per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub done: i64,
}

/// Extracts a lowercase `owner/name` from a bare identifier or from any text
/// containing a `github.com/owner/name` URL.
pub fn parse_repo_id(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let raw = match REPO_URL_RE.captures(trimmed) {
        Some(caps) => caps.get(1)?.as_str(),
        None if REPO_ID_RE.is_match(trimmed) => trimmed,
        None => return None,
    };
    let id = raw.trim_end_matches('/').trim_end_matches(".git");
    let (owner, name) = id.split_once('/')?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some(id.to_lowercase())
}

/// Enqueues a repository as of now. See [`enqueue_repo_at`].
pub async fn enqueue_repo(
    pool: &SqlitePool,
    repo_id: &str,
    note: Option<&str>,
    force: bool,
    rescan_after: chrono::Duration,
) -> Result<EnqueueResult, DatabaseError> {
    enqueue_repo_at(pool, repo_id, note, force, rescan_after, now_ms()).await
}

/// Applies the enqueue transition at `now_ms`.
///
/// A `done` task is requeued when `force` is set or when more than
/// `rescan_after` has elapsed since its last analysis. Requeueing keeps the
/// previous last-analyzed time until the next completion.
pub async fn enqueue_repo_at(
    pool: &SqlitePool,
    repo_id: &str,
    note: Option<&str>,
    force: bool,
    rescan_after: chrono::Duration,
    now_ms: i64,
) -> Result<EnqueueResult, DatabaseError> {
    let repo_id = repo_id.trim().to_lowercase();
    let mut tx = pool.begin().await.map_err(DatabaseError::SqlError)?;

    let existing = sqlx::query("SELECT status, last_analyzed_ms FROM repo_tasks WHERE repo_id = ?")
        .bind(&repo_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::SqlError)?;

    let result = match existing {
        None => {
            sqlx::query(
                "INSERT INTO repo_tasks (repo_id, status, note, queued_at_ms, updated_at_ms)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&repo_id)
            .bind(RepoStatus::Pending.as_ref())
            .bind(note)
            .bind(now_ms)
            .bind(now_ms)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::SqlError)?;
            EnqueueResult::Queued
        }
        Some(row) => {
            let status: String = row.get("status");
            let last_analyzed_ms: Option<i64> = row.get("last_analyzed_ms");
            if status == RepoStatus::Pending.as_ref() {
                EnqueueResult::AlreadyQueued
            } else {
                let stale = match last_analyzed_ms {
                    Some(at) => now_ms - at > rescan_after.num_milliseconds(),
                    None => true,
                };
                if force || stale {
                    sqlx::query(
                        "UPDATE repo_tasks
                         SET status = ?, note = COALESCE(?, note), queued_at_ms = ?, updated_at_ms = ?
                         WHERE repo_id = ?",
                    )
                    .bind(RepoStatus::Pending.as_ref())
                    .bind(note)
                    .bind(now_ms)
                    .bind(now_ms)
                    .bind(&repo_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(DatabaseError::SqlError)?;
                    EnqueueResult::Requeued
                } else {
                    EnqueueResult::AlreadyAnalyzed
                }
            }
        }
    };

    tx.commit().await.map_err(DatabaseError::SqlError)?;
    log::debug!("Enqueue {repo_id}: {result}");
    Ok(result)
}

/// Marks a pending repository as analyzed now.
pub async fn complete_repo(pool: &SqlitePool, repo_id: &str, note: Option<&str>) -> Result<bool, DatabaseError> {
    complete_repo_at(pool, repo_id, note, now_ms()).await
}

/// Moves a `pending` task to `done` with `last_analyzed_ms = now_ms`.
///
/// Returns false when no pending task exists for `repo_id`.
pub async fn complete_repo_at(
    pool: &SqlitePool,
    repo_id: &str,
    note: Option<&str>,
    now_ms: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE repo_tasks
         SET status = ?, note = COALESCE(?, note), last_analyzed_ms = ?, updated_at_ms = ?
         WHERE repo_id = ? AND status = ?",
    )
    .bind(RepoStatus::Done.as_ref())
    .bind(note)
    .bind(now_ms)
    .bind(now_ms)
    .bind(repo_id.trim().to_lowercase())
    .bind(RepoStatus::Pending.as_ref())
    .execute(pool)
    .await
    .map_err(DatabaseError::SqlError)?;
    Ok(result.rows_affected() > 0)
}

/// Oldest pending tasks first.
pub async fn pending_repos(pool: &SqlitePool, limit: i64) -> Result<Vec<RepoTask>, DatabaseError> {
    let rows = sqlx::query(
        "SELECT repo_id, status, note, queued_at_ms, last_analyzed_ms
         FROM repo_tasks WHERE status = ?
         ORDER BY queued_at_ms ASC, id ASC
         LIMIT ?",
    )
    .bind(RepoStatus::Pending.as_ref())
    .bind(limit.max(0))
    .fetch_all(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    rows.iter()
        .map(RepoTask::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::SqlError)
}

/// Reads one task, if queued at some point.
pub async fn get_repo_task(pool: &SqlitePool, repo_id: &str) -> Result<Option<RepoTask>, DatabaseError> {
    let row = sqlx::query(
        "SELECT repo_id, status, note, queued_at_ms, last_analyzed_ms
         FROM repo_tasks WHERE repo_id = ?",
    )
    .bind(repo_id.trim().to_lowercase())
    .fetch_optional(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    row.as_ref()
        .map(RepoTask::from_row)
        .transpose()
        .map_err(DatabaseError::SqlError)
}

pub async fn queue_stats(pool: &SqlitePool) -> Result<QueueStats, DatabaseError> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM repo_tasks GROUP BY status")
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;

    let mut stats = QueueStats::default();
    for row in rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        match status.parse::<RepoStatus>() {
            Ok(RepoStatus::Pending) => stats.pending = n,
            Ok(RepoStatus::Done) => stats.done = n,
            Err(_) => log::warn!("Unknown repo task status {status:?}"),
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::create_test_pool;

    const T0: i64 = 1_760_000_000_000;

    fn week() -> chrono::Duration {
        chrono::Duration::days(7)
    }

    #[tokio::test]
    async fn test_enqueue_lifecycle() {
        let pool = create_test_pool().await;

        let r = enqueue_repo_at(&pool, "Owner/Repo", Some("manual"), false, week(), T0).await.unwrap();
        assert_eq!(r, EnqueueResult::Queued);

        let r = enqueue_repo_at(&pool, "owner/repo", None, false, week(), T0 + 1).await.unwrap();
        assert_eq!(r, EnqueueResult::AlreadyQueued);

        assert!(complete_repo_at(&pool, "OWNER/repo", None, T0 + 10).await.unwrap());
        let task = get_repo_task(&pool, "owner/repo").await.unwrap().unwrap();
        assert_eq!(task.status, RepoStatus::Done);
        assert_eq!(task.note.as_deref(), Some("manual"));
        assert_eq!(task.last_analyzed.map(|t| t.timestamp_millis()), Some(T0 + 10));

        let r = enqueue_repo_at(&pool, "owner/repo", None, false, week(), T0 + 20).await.unwrap();
        assert_eq!(r, EnqueueResult::AlreadyAnalyzed);
        let unchanged = get_repo_task(&pool, "owner/repo").await.unwrap().unwrap();
        assert_eq!(unchanged.status, RepoStatus::Done);
    }

    #[tokio::test]
    async fn test_requeue_after_threshold() {
        let pool = create_test_pool().await;
        let analyzed_at = T0 + 5;
        enqueue_repo_at(&pool, "a/b", None, false, week(), T0).await.unwrap();
        complete_repo_at(&pool, "a/b", None, analyzed_at).await.unwrap();

        let at_threshold = analyzed_at + week().num_milliseconds();
        let r = enqueue_repo_at(&pool, "a/b", None, false, week(), at_threshold).await.unwrap();
        assert_eq!(r, EnqueueResult::AlreadyAnalyzed);

        let r = enqueue_repo_at(&pool, "a/b", Some("stale"), false, week(), at_threshold + 1)
            .await
            .unwrap();
        assert_eq!(r, EnqueueResult::Requeued);

        let task = get_repo_task(&pool, "a/b").await.unwrap().unwrap();
        assert_eq!(task.status, RepoStatus::Pending);
        assert_eq!(task.note.as_deref(), Some("stale"));
        // Kept until the next completion.
        assert_eq!(task.last_analyzed.map(|t| t.timestamp_millis()), Some(analyzed_at));
    }

    #[tokio::test]
    async fn test_force_requeues_recent_repo() {
        let pool = create_test_pool().await;
        enqueue_repo_at(&pool, "a/b", None, false, week(), T0).await.unwrap();
        complete_repo_at(&pool, "a/b", None, T0 + 1).await.unwrap();

        let r = enqueue_repo_at(&pool, "a/b", None, true, week(), T0 + 2).await.unwrap();
        assert_eq!(r, EnqueueResult::Requeued);
    }

    #[tokio::test]
    async fn test_complete_unknown_repo_is_false() {
        let pool = create_test_pool().await;
        assert!(!complete_repo_at(&pool, "nobody/nothing", None, T0).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_order_and_stats() {
        let pool = create_test_pool().await;
        enqueue_repo_at(&pool, "x/late", None, false, week(), T0 + 30).await.unwrap();
        enqueue_repo_at(&pool, "x/early", None, false, week(), T0 + 10).await.unwrap();
        enqueue_repo_at(&pool, "x/done", None, false, week(), T0 + 20).await.unwrap();
        complete_repo_at(&pool, "x/done", None, T0 + 40).await.unwrap();

        let pending: Vec<_> = pending_repos(&pool, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.repo_id)
            .collect();
        assert_eq!(pending, vec!["x/early", "x/late"]);
        assert_eq!(pending_repos(&pool, 1).await.unwrap().len(), 1);

        assert_eq!(queue_stats(&pool).await.unwrap(), QueueStats { pending: 2, done: 1 });
    }

    #[test]
    fn test_parse_repo_id() {
        assert_eq!(
            parse_repo_id("please add https://github.com/Owner-1/repo_2 now").as_deref(),
            Some("owner-1/repo_2")
        );
        assert_eq!(parse_repo_id("github.com/a/b.git").as_deref(), Some("a/b"));
        assert_eq!(parse_repo_id("  Some.Org/Proxy-List ").as_deref(), Some("some.org/proxy-list"));
        assert_eq!(parse_repo_id("not a repo"), None);
        assert_eq!(parse_repo_id("a/b/c"), None);
    }

    #[test]
    fn test_enqueue_result_labels() {
        assert_eq!(EnqueueResult::AlreadyAnalyzed.to_string(), "already_analyzed");
        assert_eq!(EnqueueResult::Queued.as_ref(), "queued");
    }
}
