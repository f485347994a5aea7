//! Logbook Track Query Engine
//!
//! Turns a map viewport into track geometry: resolves geohash buckets for
//! the box, fetches the overlapping track segments, groups them into
//! periods and rebuilds decimated coordinate lines per period, optionally
//! aligning auxiliary signal series to the same time buckets.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::bbox::BoundingBox;
use crate::geohash;
use crate::geojson::{Feature, FeatureCollection, Geometry, Line, TrackProperties};
use crate::store::TrackStore;
use crate::types::{Period, SegmentRow, TrackPoint};
use chrono::{DateTime, Duration, Utc};
use logbook_common::config::{RecorderConfig, TrackConfig};
use logbook_common::utils::format_timestamp;
use logbook_common::{LogbookError, Result};
use logbook_timeseries::{AggregateMethod, AggregateQuery, BucketGrid, PointStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Finest precision considered when resolving buckets.
pub const MAX_BUCKET_PRECISION: usize = 9;

/// Box span (meters, exclusive upper bound) to display resolution.
const RESOLUTION_TABLE: [(f64, i64); 4] = [
    (2_000.0, 1),
    (20_000.0, 10),
    (200_000.0, 60),
    (1_000_000.0, 3_600),
];

const COARSEST_RESOLUTION_SECS: i64 = 86_400;

/// Display time resolution for a box of the given diagonal span.
pub fn resolution_for(distance_m: f64) -> Duration {
    let secs = RESOLUTION_TABLE
        .iter()
        .find(|(limit, _)| distance_m < *limit)
        .map_or(COARSEST_RESOLUTION_SECS, |(_, secs)| *secs);
    Duration::seconds(secs)
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct TrackQueryConfig {
    pub self_context: String,
    pub max_buckets: usize,
    pub period_padding: Duration,
    pub gap_threshold: Duration,
}

impl TrackQueryConfig {
    pub fn new(recorder: &RecorderConfig, tracks: &TrackConfig) -> Self {
        Self {
            self_context: recorder.self_context.clone(),
            max_buckets: tracks.max_buckets,
            period_padding: Duration::seconds(tracks.period_padding_secs as i64),
            gap_threshold: Duration::seconds(tracks.gap_threshold_secs as i64),
        }
    }
}

impl Default for TrackQueryConfig {
    fn default() -> Self {
        Self::new(&RecorderConfig::default(), &TrackConfig::default())
    }
}

// =============================================================================
// Track Query Engine
// =============================================================================

/// Read side of the track store.
pub struct TrackQueryEngine {
    config: TrackQueryConfig,
    tracks: Arc<dyn TrackStore>,
    points: Arc<dyn PointStore>,
}

impl TrackQueryEngine {
    pub fn new(
        config: TrackQueryConfig,
        tracks: Arc<dyn TrackStore>,
        points: Arc<dyn PointStore>,
    ) -> Self {
        Self {
            config,
            tracks,
            points,
        }
    }

    pub fn config(&self) -> &TrackQueryConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Bucket Resolution
    // -------------------------------------------------------------------------

    /// Finest-precision bucket set covering `bbox` within the bucket cap.
    pub fn resolve_buckets(&self, bbox: &BoundingBox) -> Vec<String> {
        let fits = |precision: usize| {
            geohash::count_cells(bbox.sw_lat, bbox.sw_lng, bbox.ne_lat, bbox.ne_lng, precision)
                <= self.config.max_buckets as u64
        };

        // precision 1 covers the globe in 32 cells, so it is the floor
        let precision = (1..=MAX_BUCKET_PRECISION)
            .take_while(|p| fits(*p))
            .last()
            .unwrap_or(1);

        let buckets: BTreeSet<String> =
            geohash::bboxes(bbox.sw_lat, bbox.sw_lng, bbox.ne_lat, bbox.ne_lng, precision)
                .into_iter()
                .collect();
        buckets.into_iter().collect()
    }

    /// Track rows whose bucket key falls under any of `buckets`.
    pub async fn fetch_segments(&self, buckets: &[String]) -> Result<Vec<SegmentRow>> {
        self.tracks.segments(buckets).await
    }

    // -------------------------------------------------------------------------
    // Period Grouping
    // -------------------------------------------------------------------------

    /// One period per persisted track id, ordered by start.
    pub fn group_into_periods(&self, rows: &[SegmentRow]) -> Vec<Period> {
        let mut bounds: HashMap<i64, (DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
        for row in rows {
            let ts = row.point.timestamp;
            bounds
                .entry(row.point.track_id)
                .and_modify(|(start, end)| {
                    *start = (*start).min(ts);
                    *end = (*end).max(ts);
                })
                .or_insert((ts, ts));
        }

        let mut periods: Vec<Period> = bounds
            .into_iter()
            .map(|(id, (start, end))| Period {
                id: Some(id),
                start,
                end: end + self.config.period_padding,
            })
            .collect();
        periods.sort_by_key(|p| (p.start, p.id));
        periods
    }

    /// Split time-ordered rows wherever consecutive samples are further
    /// apart than the gap threshold. Used when track metadata is missing.
    pub fn group_by_gaps(&self, rows: &[SegmentRow]) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        for row in rows {
            let ts = row.point.timestamp;
            current = match current {
                Some((start, last)) if ts - last <= self.config.gap_threshold => Some((start, ts)),
                Some((start, last)) => {
                    periods.push(self.gap_period(start, last));
                    Some((ts, ts))
                }
                None => Some((ts, ts)),
            };
        }
        if let Some((start, last)) = current {
            periods.push(self.gap_period(start, last));
        }
        periods
    }

    fn gap_period(&self, start: DateTime<Utc>, last: DateTime<Utc>) -> Period {
        Period {
            id: None,
            start,
            end: last + self.config.period_padding,
        }
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    /// One MultiLineString feature per period.
    pub async fn query_geometry(
        &self,
        periods: &[Period],
        bbox: &BoundingBox,
        aux_paths: &[String],
        context: Option<&str>,
    ) -> Result<Vec<Feature>> {
        let resolution = resolution_for(bbox.diagonal_distance());
        let context = context.unwrap_or(&self.config.self_context);

        let mut features = Vec::with_capacity(periods.len());
        for period in periods {
            let grid = BucketGrid::new(period.start, period.end, resolution)?;
            let positions = self.tracks.positions(period.start, period.end).await?;
            let lines = TrackLines::build(&grid, &positions);

            let mut values = BTreeMap::new();
            for path in aux_paths {
                let aggregated = self
                    .points
                    .aggregate(&AggregateQuery {
                        measurement: path.clone(),
                        context: context.to_string(),
                        grid,
                        method: AggregateMethod::Average,
                    })
                    .await?;
                values.insert(path.clone(), lines.align(&aggregated));
            }

            features.push(lines.into_feature(period.id, period.start, period.end, values));
        }

        Ok(features)
    }

    /// Full viewport query: buckets, segments, periods, geometry.
    pub async fn tracks_in(
        &self,
        bbox: &BoundingBox,
        aux_paths: &[String],
        context: Option<&str>,
    ) -> Result<FeatureCollection> {
        let buckets = self.resolve_buckets(bbox);
        let rows = self.fetch_segments(&buckets).await?;

        let periods = if rows.iter().all(|r| r.track_uuid.is_some()) {
            self.group_into_periods(&rows)
        } else {
            self.group_by_gaps(&rows)
        };
        tracing::debug!(buckets = buckets.len(), rows = rows.len(), periods = periods.len(), "track query");

        let features = self.query_geometry(&periods, bbox, aux_paths, context).await?;
        Ok(FeatureCollection::new(features))
    }

    /// Positions over `[now - timespan, now]` as a single feature.
    pub async fn legacy_track(
        &self,
        timespan: Duration,
        resolution: Duration,
        now: DateTime<Utc>,
    ) -> Result<Feature> {
        let from = now
            .checked_sub_signed(timespan)
            .ok_or_else(|| LogbookError::validation("timespan reaches before the earliest supported time"))?;
        let grid = BucketGrid::new(from, now, resolution)?;
        let positions = self.tracks.positions(from, now).await?;
        let lines = TrackLines::build(&grid, &positions);
        Ok(lines.into_feature(None, from, now, BTreeMap::new()))
    }
}

// =============================================================================
// Line Assembly
// =============================================================================

/// Coordinate lines plus the bucket start of every coordinate.
struct TrackLines {
    lines: Vec<Line>,
    times: Vec<Vec<DateTime<Utc>>>,
}

impl TrackLines {
    /// First sample per bucket; an empty bucket ends the current line.
    /// `positions` must be in time order. Only occupied buckets are visited.
    fn build(grid: &BucketGrid, positions: &[TrackPoint]) -> Self {
        let mut lines = Vec::new();
        let mut times = Vec::new();
        let mut line: Line = Vec::new();
        let mut line_times = Vec::new();
        let mut last_idx: Option<usize> = None;

        for point in positions {
            let Some(idx) = grid.index_of(point.timestamp) else {
                continue;
            };
            match last_idx {
                Some(last) if idx == last => continue,
                Some(last) if idx != last + 1 && !line.is_empty() => {
                    lines.push(std::mem::take(&mut line));
                    times.push(std::mem::take(&mut line_times));
                }
                _ => {}
            }
            line.push([point.longitude, point.latitude]);
            line_times.push(grid.start_of(idx));
            last_idx = Some(idx);
        }
        if !line.is_empty() {
            lines.push(line);
            times.push(line_times);
        }

        Self { lines, times }
    }

    /// Values per coordinate by exact bucket timestamp, `null` if unmatched.
    fn align(&self, series: &[(DateTime<Utc>, Value)]) -> Vec<Vec<Value>> {
        let by_time: HashMap<DateTime<Utc>, &Value> = series.iter().map(|(ts, v)| (*ts, v)).collect();
        self.times
            .iter()
            .map(|line| {
                line.iter()
                    .map(|ts| by_time.get(ts).map_or(Value::Null, |v| (*v).clone()))
                    .collect()
            })
            .collect()
    }

    fn into_feature(
        self,
        id: Option<i64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        values: BTreeMap<String, Vec<Vec<Value>>>,
    ) -> Feature {
        let clipped_start = self.times.first().and_then(|l| l.first()).copied();
        let clipped_end = self.times.last().and_then(|l| l.last()).copied();

        Feature {
            properties: TrackProperties {
                id,
                start_time: format_timestamp(start),
                end_time: format_timestamp(end),
                clipped_start_time: clipped_start.map(format_timestamp),
                clipped_end_time: clipped_end.map(format_timestamp),
                values,
            },
            geometry: Geometry::multi_line(self.lines),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteTrackStore;
    use logbook_common::utils::parse_duration_spec;
    use logbook_common::{Point, PointTags};
    use logbook_timeseries::MemoryPointStore;
    use serde_json::json;

    const SELF: &str = "vessels.urn:mrn:imo:mmsi:230000000";

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid base time")
    }

    fn engine_with(tracks: Arc<SqliteTrackStore>, points: Arc<MemoryPointStore>) -> TrackQueryEngine {
        let config = TrackQueryConfig {
            self_context: SELF.to_string(),
            ..TrackQueryConfig::default()
        };
        TrackQueryEngine::new(config, tracks, points)
    }

    fn engine() -> TrackQueryEngine {
        engine_with(
            Arc::new(SqliteTrackStore::in_memory().unwrap()),
            Arc::new(MemoryPointStore::new()),
        )
    }

    fn row(track_id: i64, secs: i64) -> SegmentRow {
        SegmentRow {
            point: TrackPoint {
                track_id,
                timestamp: base() + Duration::seconds(secs),
                bucket_key: "udm".into(),
                latitude: 60.1,
                longitude: 24.9,
            },
            track_uuid: None,
        }
    }

    async fn insert(store: &SqliteTrackStore, track_id: i64, secs: i64, lat: f64, lon: f64) {
        store
            .insert_point(&TrackPoint {
                track_id,
                timestamp: base() + Duration::seconds(secs),
                bucket_key: geohash::encode(lat, lon, 9),
                latitude: lat,
                longitude: lon,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_resolution_table() {
        assert_eq!(resolution_for(500.0), Duration::seconds(1));
        assert_eq!(resolution_for(2_000.0), Duration::seconds(10));
        assert_eq!(resolution_for(150_000.0), Duration::minutes(1));
        assert_eq!(resolution_for(999_999.0), Duration::hours(1));
        assert_eq!(resolution_for(5_000_000.0), Duration::days(1));
    }

    #[test]
    fn test_resolve_buckets_cap() {
        let engine = engine();
        let fixtures = [
            "24.5,60.0,25.2,60.3",
            "-180,-90,180,90",
            "24.9,60.1,24.9001,60.1001",
            "-10,35,30,70",
        ];
        for raw in fixtures {
            let bbox: BoundingBox = raw.parse().unwrap();
            let buckets = engine.resolve_buckets(&bbox);
            assert!(!buckets.is_empty());
            assert!(buckets.len() <= 32, "{} -> {}", raw, buckets.len());

            // the next precision would exceed the cap
            let precision = buckets[0].len();
            if precision < MAX_BUCKET_PRECISION {
                let finer =
                    geohash::count_cells(bbox.sw_lat, bbox.sw_lng, bbox.ne_lat, bbox.ne_lng, precision + 1);
                assert!(finer > 32, "{} precision {}", raw, precision);
            }
        }
    }

    #[test]
    fn test_group_into_periods_by_track() {
        let engine = engine();
        let rows = vec![row(1, 0), row(1, 120), row(2, 3600), row(2, 3660)];
        let periods = engine.group_into_periods(&rows);

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].id, Some(1));
        assert_eq!(periods[0].start, base());
        assert_eq!(periods[0].end, base() + Duration::seconds(180));
        assert_eq!(periods[1].id, Some(2));
    }

    #[test]
    fn test_group_by_gaps() {
        let engine = engine();
        let rows = vec![row(0, 0), row(0, 240), row(0, 900), row(0, 960)];
        let periods = engine.group_by_gaps(&rows);

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].end, base() + Duration::seconds(300));
        assert_eq!(periods[1].start, base() + Duration::seconds(900));
        assert!(periods.iter().all(|p| p.id.is_none()));
    }

    #[tokio::test]
    async fn test_geometry_breaks_on_gaps() {
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let points = Arc::new(MemoryPointStore::new());
        let engine = engine_with(tracks.clone(), points.clone());

        let track = tracks.create_track(base()).await.unwrap();
        // samples at 0,1,2s then a hole at 3s, then 4s
        for (secs, lon) in [(0, 24.900), (1, 24.901), (2, 24.902), (4, 24.904)] {
            insert(&tracks, track.id, secs, 60.1, lon).await;
        }
        points
            .write_points(vec![
                Point::number("navigation.speedOverGround", base(), PointTags::new(SELF, ""), 3.0),
                Point::number(
                    "navigation.speedOverGround",
                    base() + Duration::seconds(4),
                    PointTags::new(SELF, ""),
                    5.0,
                ),
            ])
            .await
            .unwrap();

        let bbox: BoundingBox = "24.899,60.099,24.905,60.101".parse().unwrap();
        let period = Period {
            id: Some(track.id),
            start: base(),
            end: base() + Duration::seconds(5),
        };
        let features = engine
            .query_geometry(&[period], &bbox, &["navigation.speedOverGround".to_string()], None)
            .await
            .unwrap();

        assert_eq!(features.len(), 1);
        let lines = features[0].geometry.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 3);
        assert_eq!(lines[1], vec![[24.904, 60.1]]);

        let props = &features[0].properties;
        assert_eq!(props.clipped_start_time.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(
            props.values["navigation.speedOverGround"],
            vec![vec![json!(3.0), Value::Null, Value::Null], vec![json!(5.0)]]
        );
    }

    #[tokio::test]
    async fn test_tracks_in_viewport() {
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let engine = engine_with(tracks.clone(), Arc::new(MemoryPointStore::new()));

        let first = tracks.create_track(base()).await.unwrap();
        insert(&tracks, first.id, 0, 60.1, 24.9).await;
        insert(&tracks, first.id, 60, 60.11, 24.91).await;
        let second = tracks.create_track(base() + Duration::hours(2)).await.unwrap();
        insert(&tracks, second.id, 7200, 60.12, 24.92).await;
        let elsewhere = tracks.create_track(base() + Duration::hours(5)).await.unwrap();
        insert(&tracks, elsewhere.id, 18000, -33.9, 151.2).await;

        let bbox: BoundingBox = "24.5,60.0,25.2,60.3".parse().unwrap();
        let collection = engine.tracks_in(&bbox, &[], None).await.unwrap();

        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.features[0].properties.id, Some(first.id));
        assert_eq!(collection.features[1].properties.id, Some(second.id));
    }

    #[tokio::test]
    async fn test_empty_period_feature() {
        let engine = engine();
        let bbox: BoundingBox = "24.5,60.0,25.2,60.3".parse().unwrap();
        let period = Period {
            id: Some(9),
            start: base(),
            end: base() + Duration::minutes(5),
        };
        let features = engine.query_geometry(&[period], &bbox, &[], None).await.unwrap();
        assert!(features[0].geometry.lines().is_empty());
        assert!(features[0].properties.clipped_start_time.is_none());
    }

    #[tokio::test]
    async fn test_legacy_track_rejects_unrepresentable_timespan() {
        let engine = engine();
        let timespan = parse_duration_spec("100000000w").unwrap();
        let err = engine
            .legacy_track(timespan, Duration::minutes(1), base())
            .await
            .unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_legacy_track_fine_grid_over_long_span() {
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let engine = engine_with(tracks.clone(), Arc::new(MemoryPointStore::new()));
        let now = base();

        // a thousand weeks at one second is ~6e8 buckets
        let empty = engine
            .legacy_track(Duration::weeks(1000), Duration::seconds(1), now)
            .await
            .unwrap();
        assert!(empty.geometry.lines().is_empty());

        let track = tracks.create_track(now - Duration::weeks(52)).await.unwrap();
        let year_ago = -Duration::weeks(52).num_seconds();
        for secs in [0, 1, 2, 60, 61] {
            insert(&tracks, track.id, year_ago + secs, 60.1, 24.9 + secs as f64 * 0.001).await;
        }
        let feature = engine
            .legacy_track(Duration::weeks(1000), Duration::seconds(1), now)
            .await
            .unwrap();
        let lines = feature.geometry.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 3);
        assert_eq!(lines[1].len(), 2);
    }

    #[test]
    fn test_sparse_samples_become_single_point_lines() {
        // 60 s spacing under a 1 s grid leaves every other bucket empty
        let grid = BucketGrid::new(base(), base() + Duration::minutes(5), Duration::seconds(1)).unwrap();
        let positions: Vec<TrackPoint> = (0..5).map(|m| row(1, m * 60).point).collect();
        let lines = TrackLines::build(&grid, &positions);

        assert_eq!(lines.lines.len(), 5);
        assert!(lines.lines.iter().all(|l| l.len() == 1));
    }

    #[tokio::test]
    async fn test_legacy_track() {
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let engine = engine_with(tracks.clone(), Arc::new(MemoryPointStore::new()));
        let track = tracks.create_track(base()).await.unwrap();
        for minute in 0..10 {
            insert(&tracks, track.id, minute * 60, 60.1, 24.9 + minute as f64 * 0.001).await;
        }

        let now = base() + Duration::minutes(10);
        let feature = engine
            .legacy_track(Duration::hours(1), Duration::minutes(1), now)
            .await
            .unwrap();
        let lines = feature.geometry.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 10);
        assert!(feature.properties.id.is_none());
    }
}
