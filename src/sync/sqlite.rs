//! SQLite-backed shared store.
//!
//! Instances sharing one database file share endpoint health. The conditional
//! write is a single `UPDATE ... WHERE updated_at = ?`, so SQLite's own write
//! lock makes compare-and-swap atomic across processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::record::{expiry_for, now_secs, LatencySample, SharedHealthRecord, StateKey};
use crate::sync::store::{HealthStateStore, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS provider_health (
    state_key       TEXT PRIMARY KEY,
    health_score    REAL NOT NULL,
    latency_history TEXT NOT NULL,
    updated_at      INTEGER NOT NULL,
    ttl             INTEGER NOT NULL
)";

/// [`HealthStateStore`] backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
}

impl SqliteStateStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::with_connection(conn, ttl)
    }

    /// Private in-memory database.
    pub fn in_memory(ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(backend)?;
        conn.execute(SCHEMA, []).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&*conn.lock()))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn read_record(conn: &Connection, id: &str) -> Result<Option<SharedHealthRecord>, StoreError> {
    let row: Option<(f64, String, i64, i64)> = conn
        .query_row(
            "SELECT health_score, latency_history, updated_at, ttl FROM provider_health WHERE state_key = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(backend)?;

    let Some((health_score, history, updated_at, ttl)) = row else {
        return Ok(None);
    };
    let latency_history: Vec<LatencySample> = serde_json::from_str(&history)?;
    Ok(Some(SharedHealthRecord {
        health_score,
        latency_history,
        updated_at: updated_at as u64,
        ttl: ttl as u64,
    }))
}

#[async_trait]
impl HealthStateStore for SqliteStateStore {
    async fn read(&self, key: &StateKey) -> Result<Option<SharedHealthRecord>, StoreError> {
        let id = key.to_string();
        let record = self.blocking(move |conn| read_record(conn, &id)).await?;
        let now = now_secs();
        Ok(record.filter(|r| !r.is_expired(now)))
    }

    async fn write(
        &self,
        key: &StateKey,
        record: SharedHealthRecord,
        previous_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let id = key.to_string();
        let ttl = expiry_for(record.updated_at, self.ttl) as i64;
        let history = serde_json::to_string(&record.latency_history)?;
        let score = record.health_score;
        let updated_at = record.updated_at as i64;

        self.blocking(move |conn| {
            let Some(expected) = previous_version else {
                conn.execute(
                    "INSERT INTO provider_health (state_key, health_score, latency_history, updated_at, ttl)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(state_key) DO UPDATE SET
                        health_score = excluded.health_score,
                        latency_history = excluded.latency_history,
                        updated_at = excluded.updated_at,
                        ttl = excluded.ttl",
                    params![id, score, history, updated_at, ttl],
                )
                .map_err(backend)?;
                return Ok(());
            };

            let changed = conn
                .execute(
                    "UPDATE provider_health
                     SET health_score = ?2, latency_history = ?3, updated_at = ?4, ttl = ?5
                     WHERE state_key = ?1 AND updated_at = ?6",
                    params![id, score, history, updated_at, ttl, expected as i64],
                )
                .map_err(backend)?;
            if changed == 1 {
                return Ok(());
            }

            let actual = read_record(conn, &id)?.map(|r| r.updated_at);
            Err(StoreError::VersionConflict { expected, actual })
        })
        .await
    }
}
