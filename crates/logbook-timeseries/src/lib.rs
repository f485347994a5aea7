//! Logbook Time Series - Point Encoding and Storage
//!
//! Write-side sampling encoder and the point datastore abstraction used by
//! both the recorder and the reconstructors.
//!
//! Key Features:
//! - Type dispatch onto single-field points
//! - Per-(context, path) decimation on event timestamps
//! - Bucketed mean/min/max/first aggregation anchored at the window start
//! - Async `PointStore` trait with an in-memory implementation
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod aggregation;
pub mod encoder;
pub mod store;

pub use aggregation::{AggregateMethod, Aggregator, BucketGrid, Downsampler};
pub use encoder::{EncoderConfig, PathFilter, SamplingEncoder};
pub use store::{AggregateQuery, MemoryPointStore, PointStore, RawQuery, StoreStats};
