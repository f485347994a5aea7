//! Logbook Track Store
//!
//! Persistence for tracks and their decimated position samples. The SQLite
//! implementation keeps two tables: `track(id, uuid, name)` and
//! `trackdata(track_id, timestamp, bucket_key, latitude, longitude)`, with
//! timestamps stored as epoch milliseconds.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{SegmentRow, Track, TrackPoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logbook_common::{LogbookError, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Track Store Trait
// =============================================================================

/// Storage for tracks and track points.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Allocate a new track starting at `origin`.
    async fn create_track(&self, origin: DateTime<Utc>) -> Result<Track>;

    /// Persist one track point.
    async fn insert_point(&self, point: &TrackPoint) -> Result<()>;

    /// Points whose bucket key starts with any of `prefixes`, by timestamp.
    async fn segments(&self, prefixes: &[String]) -> Result<Vec<SegmentRow>>;

    /// Points within the closed window `[from, to]`, by timestamp.
    async fn positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrackPoint>>;

    /// Bounded check for any point within `[from, to]`.
    async fn has_positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<bool>;

    /// All tracks, oldest first.
    async fn tracks(&self) -> Result<Vec<Track>>;
}

// =============================================================================
// SQLite Track Store
// =============================================================================

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS track(
        id INTEGER PRIMARY KEY,
        uuid TEXT NOT NULL,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS trackdata(
        track_id INTEGER NOT NULL REFERENCES track(id),
        timestamp INTEGER NOT NULL,
        bucket_key TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trackdata_bucket_key ON trackdata(bucket_key);
    CREATE INDEX IF NOT EXISTS idx_trackdata_timestamp ON trackdata(timestamp);
";

type PointRow = (i64, i64, String, f64, f64);

/// Track store backed by a local SQLite file. Queries run on tokio's
/// blocking pool.
pub struct SqliteTrackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(LogbookError::storage)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(LogbookError::storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(LogbookError::storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored track points.
    pub fn point_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM trackdata", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(LogbookError::storage)
    }

    /// Run `f` against the connection off the async executor.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| LogbookError::internal(format!("track store task failed: {}", e)))?
            .map_err(LogbookError::storage)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LogbookError::storage(format!("timestamp out of range: {}", ms)))
}

fn to_point((track_id, ts, bucket_key, latitude, longitude): PointRow) -> Result<TrackPoint> {
    Ok(TrackPoint {
        track_id,
        timestamp: from_millis(ts)?,
        bucket_key,
        latitude,
        longitude,
    })
}

fn point_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PointRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

#[async_trait]
impl TrackStore for SqliteTrackStore {
    async fn create_track(&self, origin: DateTime<Utc>) -> Result<Track> {
        let uuid = Uuid::new_v4();
        let id = self
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO track(uuid, name) VALUES (?1, ?2)",
                    params![uuid.to_string(), origin.to_rfc3339()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(Track { id, uuid, origin })
    }

    async fn insert_point(&self, point: &TrackPoint) -> Result<()> {
        let point = point.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO trackdata(track_id, timestamp, bucket_key, latitude, longitude)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    point.track_id,
                    point.timestamp.timestamp_millis(),
                    point.bucket_key,
                    point.latitude,
                    point.longitude
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn segments(&self, prefixes: &[String]) -> Result<Vec<SegmentRow>> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }

        let clause = vec!["d.bucket_key LIKE ? || '%'"; prefixes.len()].join(" OR ");
        let sql = format!(
            "SELECT d.track_id, d.timestamp, d.bucket_key, d.latitude, d.longitude, t.uuid
             FROM trackdata d LEFT JOIN track t ON t.id = d.track_id
             WHERE {}
             ORDER BY d.timestamp",
            clause
        );
        let prefixes = prefixes.to_vec();

        let rows: Vec<(PointRow, Option<String>)> = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(params_from_iter(prefixes.iter()), |row| {
                    Ok((point_row(row)?, row.get(5)?))
                })?;
                mapped.collect()
            })
            .await?;

        rows.into_iter()
            .map(|(point, uuid)| {
                Ok(SegmentRow {
                    point: to_point(point)?,
                    track_uuid: uuid.and_then(|u| Uuid::parse_str(&u).ok()),
                })
            })
            .collect()
    }

    async fn positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrackPoint>> {
        let rows: Vec<PointRow> = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT track_id, timestamp, bucket_key, latitude, longitude
                     FROM trackdata WHERE timestamp >= ?1 AND timestamp <= ?2
                     ORDER BY timestamp",
                )?;
                let mapped = stmt.query_map(
                    params![from.timestamp_millis(), to.timestamp_millis()],
                    point_row,
                )?;
                mapped.collect()
            })
            .await?;

        rows.into_iter().map(to_point).collect()
    }

    async fn has_positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<bool> {
        let found: Option<i64> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM trackdata WHERE timestamp >= ?1 AND timestamp <= ?2 LIMIT 1",
                    params![from.timestamp_millis(), to.timestamp_millis()],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(found.is_some())
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let rows: Vec<(i64, String, String)> = self
            .blocking(|conn| {
                let mut stmt = conn.prepare("SELECT id, uuid, name FROM track ORDER BY id")?;
                let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                mapped.collect()
            })
            .await?;

        rows.into_iter()
            .map(|(id, uuid, name)| {
                Ok(Track {
                    id,
                    uuid: Uuid::parse_str(&uuid).map_err(LogbookError::storage)?,
                    origin: DateTime::parse_from_rfc3339(&name)
                        .map_err(LogbookError::storage)?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
