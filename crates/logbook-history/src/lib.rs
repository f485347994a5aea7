//! Logbook History - Reconstruction and Playback
//!
//! Read side of the recorder. Rebuilds tabular values, delta envelopes and
//! snapshots from the point and track stores, and replays recorded history
//! as timed delta streams.
//!
//! Key Features:
//! - Bucketed multi-path value tables
//! - Legacy delta reconstruction with attitude and position merging
//! - Snapshots and context/path discovery
//! - Per-session playback with configurable rate
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod playback;
pub mod reconstruct;
pub mod spec;

pub use playback::{PlaybackHandle, PlaybackOptions, PlaybackScheduler};
pub use reconstruct::{
    HistoryReconstructor, ReconstructorConfig, TimeRange, ValueColumn, ValuesResult,
};
pub use spec::PathSpec;
