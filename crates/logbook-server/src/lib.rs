//! Logbook Server - HTTP Query Surface
//!
//! Serves recorded signal history over JSON and GeoJSON endpoints, accepts
//! pushed delta envelopes for recording and streams playback sessions.
//!
//! Key Features:
//! - Tabular history, context and path discovery
//! - Viewport track queries with auxiliary values
//! - Delta ingestion through a subscribable source
//! - Server-sent playback streams
//! - Bulk NDJSON import
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod handlers;
pub mod import;
pub mod middleware;
pub mod recorder;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use import::{import_deltas, import_file, ImportStats};
pub use recorder::{
    BroadcastDeltaSource, DeltaHandler, DeltaSource, Recorder, RecorderStats, Subscription,
};
pub use router::create_router;
pub use state::AppState;
