//! Row types read back from the database.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::normalize::{EndpointKey, ProxyProtocol};

/// A persisted proxy endpoint, identified by `(protocol, host, port)`.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyRecord {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub source: String,
    pub country: Option<String>,
    pub alive: bool,
    pub latency_ms: Option<f64>,
    /// Decayed success rate in `[0, 1]`
    pub success_rate: f64,
    pub score: f64,
    pub last_checked: DateTime<Utc>,
}

impl ProxyRecord {
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            protocol: self.protocol,
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// `protocol://host:port`
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let protocol: String = row.try_get("protocol")?;
        let protocol = protocol
            .parse::<ProxyProtocol>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let port: i64 = row.try_get("port")?;
        let port = u16::try_from(port).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let last_checked_ms: i64 = row.try_get("last_checked_ms")?;

        Ok(Self {
            protocol,
            host: row.try_get("host")?,
            port,
            source: row.try_get("source")?,
            country: row.try_get("country")?,
            alive: row.try_get("alive")?,
            latency_ms: row.try_get("latency_ms")?,
            success_rate: row.try_get("success_rate")?,
            score: row.try_get("score")?,
            last_checked: from_ms(last_checked_ms),
        })
    }
}

/// Lifecycle state of a queued repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Done,
}

/// A repository queued for a deep scan.
#[derive(Debug, Clone, Serialize)]
pub struct RepoTask {
    /// Lowercase `owner/name`
    pub repo_id: String,
    pub status: RepoStatus,
    pub note: Option<String>,
    pub queued_at: DateTime<Utc>,
    /// Set when the task last moved to `done`
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl RepoTask {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<RepoStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let queued_at_ms: i64 = row.try_get("queued_at_ms")?;
        let last_analyzed_ms: Option<i64> = row.try_get("last_analyzed_ms")?;

        Ok(Self {
            repo_id: row.try_get("repo_id")?,
            status,
            note: row.try_get("note")?,
            queued_at: from_ms(queued_at_ms),
            last_analyzed: last_analyzed_ms.map(from_ms),
        })
    }
}

/// Counts from one pipeline cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStats {
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    /// Documents returned by all collectors
    pub raw_sources: usize,
    /// Distinct candidates sent to validation
    pub candidates: usize,
    pub alive: usize,
    /// Rows written by the batch upsert
    pub saved: usize,
    pub removed_dead: u64,
    pub removed_observations: u64,
    /// The batch upsert failed and nothing from this cycle was saved
    pub persist_failed: bool,
    pub elapsed_seconds: f64,
}

impl CycleStats {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let count = |col: &str| -> Result<usize, sqlx::Error> {
            let v: i64 = row.try_get(col)?;
            Ok(usize::try_from(v).unwrap_or(0))
        };
        let removed = |col: &str| -> Result<u64, sqlx::Error> {
            let v: i64 = row.try_get(col)?;
            Ok(u64::try_from(v).unwrap_or(0))
        };

        Ok(Self {
            started_at_ms: row.try_get("started_at_ms")?,
            finished_at_ms: row.try_get("finished_at_ms")?,
            raw_sources: count("raw_sources")?,
            candidates: count("candidates")?,
            alive: count("alive")?,
            saved: count("saved")?,
            removed_dead: removed("removed_dead")?,
            removed_observations: removed("removed_observations")?,
            persist_failed: row.try_get("persist_failed")?,
            elapsed_seconds: row.try_get("elapsed_seconds")?,
        })
    }
}

pub(crate) fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
