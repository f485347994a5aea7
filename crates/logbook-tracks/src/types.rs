//! Logbook Track Types
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted grouping of track points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub uuid: Uuid,
    pub origin: DateTime<Utc>,
}

/// One decimated position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub track_id: i64,
    pub timestamp: DateTime<Utc>,
    pub bucket_key: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A track point joined to its track's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    pub point: TrackPoint,
    pub track_uuid: Option<Uuid>,
}

/// A display window derived from a track or a gap-delimited run of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Persisted track id; `None` for gap-derived periods.
    pub id: Option<i64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
