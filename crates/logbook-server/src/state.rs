//! Logbook Server State
//!
//! Application state shared across request handlers. Owns the point and
//! track stores, the query engines built over them, the playback scheduler
//! and the recorder attached to the ingestion source.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::config::ServerConfig;
use crate::import::{import_file, ImportStats};
use crate::recorder::{BroadcastDeltaSource, Recorder, Subscription};
use logbook_common::Result;
use logbook_history::{HistoryReconstructor, PlaybackScheduler, ReconstructorConfig};
use logbook_timeseries::{EncoderConfig, MemoryPointStore, PointStore, SamplingEncoder};
use logbook_tracks::{
    SegmenterConfig, SqliteTrackStore, TrackQueryConfig, TrackQueryEngine, TrackSegmenter,
    TrackStore,
};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub points: Arc<dyn PointStore>,
    pub tracks: Arc<dyn TrackStore>,
    pub history: Arc<HistoryReconstructor>,
    pub track_query: Arc<TrackQueryEngine>,
    pub playback: Arc<PlaybackScheduler>,
    pub source: Arc<BroadcastDeltaSource>,
    pub recorder: Arc<Recorder>,
    _subscription: Arc<Subscription>,
}

impl AppState {
    /// Open the configured stores and start the recorder.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let tracks: Arc<dyn TrackStore> = match config.track_database_path() {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                tracing::info!("Track database: {}", path.display());
                Arc::new(SqliteTrackStore::open(&path)?)
            }
            None => {
                tracing::warn!("No data directory specified, tracks are kept in memory only");
                Arc::new(SqliteTrackStore::in_memory()?)
            }
        };

        Ok(Self::with_stores(config, Arc::new(MemoryPointStore::new()), tracks))
    }

    /// Build the state over existing stores. Must run inside a tokio runtime.
    pub fn with_stores(
        config: ServerConfig,
        points: Arc<dyn PointStore>,
        tracks: Arc<dyn TrackStore>,
    ) -> Self {
        let settings = &config.logbook;

        let history = Arc::new(HistoryReconstructor::new(
            ReconstructorConfig::new(&settings.recorder, &settings.history, &settings.playback),
            points.clone(),
            tracks.clone(),
        ));
        let track_query = Arc::new(TrackQueryEngine::new(
            TrackQueryConfig::new(&settings.recorder, &settings.tracks),
            tracks.clone(),
            points.clone(),
        ));
        let playback = Arc::new(PlaybackScheduler::new(history.clone(), settings.playback.tick()));

        let segmenter = Arc::new(TrackSegmenter::new(
            SegmenterConfig::new(&settings.recorder, &settings.tracks),
            tracks.clone(),
        ));
        let recorder = Arc::new(Recorder::new(
            SamplingEncoder::new(EncoderConfig::from(&settings.recorder)),
            segmenter,
            points.clone(),
        ));
        let source = Arc::new(BroadcastDeltaSource::default());
        let subscription = recorder.attach(source.as_ref());

        tracing::info!(
            self_context = %settings.recorder.self_context,
            record_track = settings.recorder.record_track,
            "recorder attached"
        );

        Self {
            config: Arc::new(config),
            points,
            tracks,
            history,
            track_query,
            playback,
            source,
            recorder,
            _subscription: Arc::new(subscription),
        }
    }

    /// Bulk-load a delta log into the point store with its own sampling state.
    pub async fn import(&self, path: &Path) -> Result<ImportStats> {
        let settings = &self.config.logbook;
        let encoder = SamplingEncoder::new(EncoderConfig::from(&settings.recorder));
        import_file(path, &encoder, self.points.as_ref(), settings.import.batch_size).await
    }
}
