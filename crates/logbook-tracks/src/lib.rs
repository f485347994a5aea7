//! Logbook Tracks - Track Recording and Geometry
//!
//! Position samples are decimated into tracks, keyed by geohash buckets in a
//! local SQLite database, and read back as GeoJSON geometry for a viewport.
//!
//! Key Features:
//! - Track segmentation by inactivity gaps
//! - Geohash bucket keys and bounding-box coverage
//! - Bucket-capped viewport queries with distance-based time resolution
//! - Auxiliary signal alignment onto track coordinates
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod bbox;
pub mod geohash;
pub mod geojson;
pub mod query;
pub mod segmenter;
pub mod store;
pub mod types;

pub use bbox::BoundingBox;
pub use geojson::{Feature, FeatureCollection, Geometry, TrackProperties, GEOJSON_CONTENT_TYPE};
pub use query::{resolution_for, TrackQueryConfig, TrackQueryEngine};
pub use segmenter::{SegmenterConfig, TrackSegmenter};
pub use store::{SqliteTrackStore, TrackStore};
pub use types::{Period, SegmentRow, Track, TrackPoint};
