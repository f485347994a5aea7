//! Logbook Track Segmenter
//!
//! Consumes self position updates, decimates them to a fixed minimum
//! spacing and persists them as track points tagged with a geohash bucket
//! key. A new track is allocated on the first sample and after every
//! inactivity gap longer than the cutoff.
//!
//! Storage failures drop only the affected sample. State advances only when
//! a point is persisted, so the next sample retries on its own.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::geohash;
use crate::store::TrackStore;
use crate::types::{Track, TrackPoint};
use chrono::{DateTime, Duration, Utc};
use logbook_common::config::{RecorderConfig, TrackConfig};
use logbook_common::{Position, SignalUpdate, POSITION_PATH, SELF_CONTEXT_ALIAS};
use std::sync::Arc;
use tokio::sync::Mutex;

// =============================================================================
// Segmenter Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub self_context: String,
    pub record_track: bool,
    pub min_interval: Duration,
    pub cutoff: Duration,
    pub precision: usize,
}

impl SegmenterConfig {
    pub fn new(recorder: &RecorderConfig, tracks: &TrackConfig) -> Self {
        Self {
            self_context: recorder.self_context.clone(),
            record_track: recorder.record_track,
            min_interval: Duration::seconds(tracks.min_interval_secs as i64),
            cutoff: Duration::seconds(tracks.cutoff_secs as i64),
            precision: tracks.bucket_precision,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::new(&RecorderConfig::default(), &TrackConfig::default())
    }
}

// =============================================================================
// Track Segmenter
// =============================================================================

#[derive(Debug, Default)]
struct SegmenterState {
    last_write: Option<DateTime<Utc>>,
    current_track: Option<Track>,
    /// Whether `current_track` has at least one persisted point.
    track_has_points: bool,
}

/// Turns position updates into persisted track points.
pub struct TrackSegmenter {
    config: SegmenterConfig,
    store: Arc<dyn TrackStore>,
    state: Mutex<SegmenterState>,
}

impl TrackSegmenter {
    pub fn new(config: SegmenterConfig, store: Arc<dyn TrackStore>) -> Self {
        Self {
            config,
            store,
            state: Mutex::new(SegmenterState::default()),
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    fn is_self(&self, context: &str) -> bool {
        context == self.config.self_context || context == SELF_CONTEXT_ALIAS
    }

    /// Record a position update; returns the persisted point, if any.
    pub async fn record(&self, update: &SignalUpdate) -> Option<TrackPoint> {
        if !self.config.record_track
            || update.path != POSITION_PATH
            || !self.is_self(&update.context)
        {
            return None;
        }

        let Some(position) = update.value.as_structured().and_then(Position::from_value) else {
            tracing::debug!(context = %update.context, "ignoring position without coordinates");
            return None;
        };
        let timestamp = update.timestamp;

        let mut state = self.state.lock().await;

        if let Some(last) = state.last_write {
            if timestamp - last <= self.config.min_interval {
                return None;
            }
        }

        let gap_exceeded = state
            .last_write
            .map_or(false, |last| timestamp - last > self.config.cutoff);

        let reusable = state
            .current_track
            .clone()
            .filter(|_| !(gap_exceeded && state.track_has_points));

        let track = match reusable {
            Some(track) => track,
            None => match self.store.create_track(timestamp).await {
                Ok(track) => {
                    tracing::info!(track_id = track.id, uuid = %track.uuid, "started new track");
                    state.current_track = Some(track.clone());
                    state.track_has_points = false;
                    track
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to allocate track, dropping position sample");
                    return None;
                }
            },
        };

        let point = TrackPoint {
            track_id: track.id,
            timestamp,
            bucket_key: geohash::encode(position.latitude, position.longitude, self.config.precision),
            latitude: position.latitude,
            longitude: position.longitude,
        };

        if let Err(e) = self.store.insert_point(&point).await {
            tracing::warn!(track_id = track.id, error = %e, "failed to write track point");
            return None;
        }

        state.last_write = Some(timestamp);
        state.track_has_points = true;
        Some(point)
    }

    /// Id of the track currently being extended.
    pub async fn current_track(&self) -> Option<i64> {
        self.state.lock().await.current_track.as_ref().map(|t| t.id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteTrackStore;
    use crate::types::SegmentRow;
    use async_trait::async_trait;
    use logbook_common::{LogbookError, Result, SignalValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SELF: &str = "vessels.urn:mrn:imo:mmsi:230000000";

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid base time")
    }

    fn config(record_track: bool) -> SegmenterConfig {
        SegmenterConfig {
            self_context: SELF.to_string(),
            record_track,
            ..SegmenterConfig::default()
        }
    }

    fn position(minutes: i64) -> SignalUpdate {
        SignalUpdate::new(
            SELF,
            POSITION_PATH,
            SignalValue::Structured(json!({"latitude": 60.1, "longitude": 24.9})),
            base() + Duration::minutes(minutes),
        )
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let segmenter = TrackSegmenter::new(config(false), store.clone());
        for minute in 0..10 {
            assert!(segmenter.record(&position(minute * 5)).await.is_none());
        }
        assert_eq!(store.point_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_min_interval() {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let segmenter = TrackSegmenter::new(config(true), store.clone());

        assert!(segmenter.record(&position(0)).await.is_some());
        let mut soon = position(0);
        soon.timestamp += Duration::seconds(30);
        assert!(segmenter.record(&soon).await.is_none());
        assert!(segmenter.record(&position(2)).await.is_some());
        assert_eq!(store.point_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cutoff_splits_tracks() {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let segmenter = TrackSegmenter::new(config(true), store.clone());

        let a = segmenter.record(&position(0)).await.unwrap();
        let b = segmenter.record(&position(5)).await.unwrap();
        let c = segmenter.record(&position(35)).await.unwrap();

        assert_eq!(a.track_id, b.track_id);
        assert_ne!(b.track_id, c.track_id);
        assert_eq!(a.bucket_key.len(), 9);
        assert_eq!(store.tracks().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ignores_other_contexts_and_paths() {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let segmenter = TrackSegmenter::new(config(true), store.clone());

        let mut other = position(0);
        other.context = "vessels.other".into();
        assert!(segmenter.record(&other).await.is_none());

        let mut speed = position(0);
        speed.path = "navigation.speedOverGround".into();
        assert!(segmenter.record(&speed).await.is_none());

        let mut alias = position(0);
        alias.context = SELF_CONTEXT_ALIAS.into();
        assert!(segmenter.record(&alias).await.is_some());
    }

    /// Track store whose point writes can be switched off.
    struct FlakyStore {
        inner: SqliteTrackStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl TrackStore for FlakyStore {
        async fn create_track(&self, origin: DateTime<Utc>) -> Result<Track> {
            self.inner.create_track(origin).await
        }
        async fn insert_point(&self, point: &TrackPoint) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LogbookError::unavailable("disk full"));
            }
            self.inner.insert_point(point).await
        }
        async fn segments(&self, prefixes: &[String]) -> Result<Vec<SegmentRow>> {
            self.inner.segments(prefixes).await
        }
        async fn positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrackPoint>> {
            self.inner.positions(from, to).await
        }
        async fn has_positions(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<bool> {
            self.inner.has_positions(from, to).await
        }
        async fn tracks(&self) -> Result<Vec<Track>> {
            self.inner.tracks().await
        }
    }

    #[tokio::test]
    async fn test_failed_write_drops_only_that_sample() {
        let store = Arc::new(FlakyStore {
            inner: SqliteTrackStore::in_memory().unwrap(),
            fail_writes: AtomicBool::new(true),
        });
        let segmenter = TrackSegmenter::new(config(true), store.clone());

        assert!(segmenter.record(&position(0)).await.is_none());

        store.fail_writes.store(false, Ordering::SeqCst);
        let mut retry = position(0);
        retry.timestamp += Duration::seconds(10);
        let point = segmenter.record(&retry).await.unwrap();

        // the track allocated before the failure is reused
        assert_eq!(store.inner.tracks().await.unwrap().len(), 1);
        assert_eq!(Some(point.track_id), segmenter.current_track().await);
    }
}
