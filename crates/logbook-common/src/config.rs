//! Logbook Config - Configuration Structures
//!
//! Configuration types for the recorder, the track store and the query
//! side. Every section has production defaults and can be overridden from a
//! TOML file or programmatically.
//!
//! Key Features:
//! - Recorder sampling and filtering policy
//! - Track database location and segmentation thresholds
//! - History, playback and bulk import tuning
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{LogbookError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Recorder Configuration
// =============================================================================

/// How `filter_paths` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Store only the listed paths.
    Whitelist,
    /// Store everything except the listed paths.
    #[default]
    Blacklist,
}

/// Configuration for the write side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub self_context: String,
    pub resolution_ms: u64,
    pub record_track: bool,
    pub store_others: bool,
    pub filter_mode: FilterMode,
    pub filter_paths: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            self_context: "vessels.self".to_string(),
            resolution_ms: 200,
            record_track: false,
            store_others: false,
            filter_mode: FilterMode::Blacklist,
            filter_paths: Vec::new(),
        }
    }
}

impl RecorderConfig {
    pub fn resolution(&self) -> Duration {
        Duration::from_millis(self.resolution_ms)
    }
}

// =============================================================================
// Track Configuration
// =============================================================================

/// Configuration for the track store and segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub database_path: PathBuf,
    pub min_interval_secs: u64,
    pub cutoff_secs: u64,
    pub bucket_precision: usize,
    pub max_buckets: usize,
    pub period_padding_secs: u64,
    pub gap_threshold_secs: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("track.sqlite"),
            min_interval_secs: 60,
            cutoff_secs: 20 * 60,
            bucket_precision: 9,
            max_buckets: 32,
            period_padding_secs: 60,
            gap_threshold_secs: 5 * 60,
        }
    }
}

// =============================================================================
// History Configuration
// =============================================================================

/// Configuration for tabular and snapshot queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Points per window when no resolution is given.
    pub default_points: u32,
    pub snapshot_lookback_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_points: 500,
            snapshot_lookback_secs: 5 * 60,
        }
    }
}

// =============================================================================
// Playback Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_ms: u64,
    pub probe_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            probe_secs: 10,
        }
    }
}

impl PlaybackConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

// =============================================================================
// Import Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// All Logbook settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogbookConfig {
    pub recorder: RecorderConfig,
    pub tracks: TrackConfig,
    pub history: HistoryConfig,
    pub playback: PlaybackConfig,
    pub import: ImportConfig,
}

impl LogbookConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LogbookError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can operate with.
    pub fn validate(&self) -> Result<()> {
        if self.recorder.self_context.is_empty() {
            return Err(LogbookError::Configuration(
                "recorder.self_context must not be empty".into(),
            ));
        }
        if !(1..=12).contains(&self.tracks.bucket_precision) {
            return Err(LogbookError::Configuration(
                "tracks.bucket_precision must be within 1..=12".into(),
            ));
        }
        if self.tracks.max_buckets == 0 {
            return Err(LogbookError::Configuration(
                "tracks.max_buckets must be positive".into(),
            ));
        }
        if self.playback.tick_ms == 0 || self.import.batch_size == 0 {
            return Err(LogbookError::Configuration(
                "playback.tick_ms and import.batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LogbookConfig::default();
        assert_eq!(config.recorder.resolution_ms, 200);
        assert!(!config.recorder.record_track);
        assert_eq!(config.tracks.cutoff_secs, 1200);
        assert_eq!(config.tracks.max_buckets, 32);
        assert_eq!(config.history.default_points, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = LogbookConfig::from_toml(
            r#"
            [recorder]
            self_context = "vessels.urn:mrn:imo:mmsi:230000000"
            record_track = true
            filter_mode = "whitelist"
            filter_paths = ["navigation.speedOverGround"]

            [tracks]
            min_interval_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.recorder.filter_mode, FilterMode::Whitelist);
        assert!(config.recorder.record_track);
        assert_eq!(config.recorder.resolution_ms, 200);
        assert_eq!(config.tracks.min_interval_secs, 30);
        assert_eq!(config.tracks.cutoff_secs, 1200);
    }

    #[test]
    fn test_invalid_config() {
        let err = LogbookConfig::from_toml("[tracks]\nbucket_precision = 0\n").unwrap_err();
        assert!(matches!(err, LogbookError::Configuration(_)));

        assert!(LogbookConfig::from_toml("recorder = 5").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logbook.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[playback]\ntick_ms = 500").unwrap();

        let config = LogbookConfig::from_file(&path).unwrap();
        assert_eq!(config.playback.tick(), Duration::from_millis(500));
    }
}
