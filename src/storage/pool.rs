//! SQLite connection pool.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::error_handling::DatabaseError;

/// Opens (creating if needed) the database at `db_path` and switches it to
/// WAL journaling.
pub async fn init_db_pool_with_path(db_path: &Path) -> Result<Arc<Pool<Sqlite>>, DatabaseError> {
    let db_path_str = db_path.to_string_lossy().to_string();
    match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(db_path)
    {
        Ok(_) => info!("Created database file {db_path_str}"),
        Err(ref e) if e.kind() == ErrorKind::AlreadyExists => {
            info!("Using existing database file {db_path_str}")
        }
        Err(e) => {
            error!("Failed to create database file {db_path_str}: {e}");
            return Err(DatabaseError::FileCreationError(e.to_string()));
        }
    }

    let pool = SqlitePool::connect(&format!("sqlite:{db_path_str}"))
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {e}");
            DatabaseError::SqlError(e)
        })?;

    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&pool)
        .await
        .map_err(|e| {
            error!("Failed to set WAL mode: {e}");
            DatabaseError::SqlError(e)
        })?;

    Ok(Arc::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_file_and_enables_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");

        let pool = init_db_pool_with_path(&path).await.unwrap();
        assert!(path.exists());

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(pool.as_ref())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_reopens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");
        init_db_pool_with_path(&path).await.unwrap();
        assert!(init_db_pool_with_path(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_parent_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/harvest.db");
        let err = init_db_pool_with_path(&path).await.unwrap_err();
        assert!(matches!(err, DatabaseError::FileCreationError(_)));
    }
}
