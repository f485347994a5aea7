//! Logbook Point Store
//!
//! Asynchronous interface to the time-series datastore plus an in-memory
//! implementation. The datastore owns durability, range scans and the
//! mean/min/max/first aggregates; the core only decides what to write and
//! how to reassemble what it reads.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::aggregation::{AggregateMethod, BucketGrid, Downsampler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logbook_common::{FieldValue, LogbookError, Point, PointTags, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// Queries
// =============================================================================

/// Windowed group-by aggregate for one measurement in one context.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub measurement: String,
    pub context: String,
    pub grid: BucketGrid,
    pub method: AggregateMethod,
}

/// Raw row scan over the half-open window `(from, to]`.
#[derive(Debug, Clone)]
pub struct RawQuery {
    /// `None` selects every context.
    pub context: Option<String>,
    /// `None` selects every measurement.
    pub measurements: Option<Vec<String>>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl RawQuery {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            context: None,
            measurements: None,
            from,
            to,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_measurements(mut self, measurements: Vec<String>) -> Self {
        self.measurements = Some(measurements);
        self
    }

    fn matches(&self, measurement: &str, tags: &PointTags) -> bool {
        if let Some(context) = &self.context {
            if &tags.context != context {
                return false;
            }
        }
        match &self.measurements {
            Some(names) => names.iter().any(|n| n == measurement),
            None => true,
        }
    }

    fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts > self.from && ts <= self.to
    }
}

// =============================================================================
// Point Store Trait
// =============================================================================

/// Time-series datastore used by the encoder and the reconstructors.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Persist a batch of points.
    async fn write_points(&self, points: Vec<Point>) -> Result<()>;

    /// Bucketed aggregate; only buckets with a result are returned, ascending.
    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<(DateTime<Utc>, Value)>>;

    /// Raw rows ordered by timestamp.
    async fn raw(&self, query: &RawQuery) -> Result<Vec<Point>>;

    /// Bounded existence probe; stops at the first matching row.
    async fn exists(&self, query: &RawQuery) -> Result<bool>;

    /// Distinct contexts with stored points.
    async fn contexts(&self) -> Result<Vec<String>>;

    /// Distinct measurement names, optionally for one context.
    async fn measurements(&self, context: Option<&str>) -> Result<Vec<String>>;
}

// =============================================================================
// Memory Point Store
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    measurement: String,
    tags: PointTags,
}

/// In-memory point store.
pub struct MemoryPointStore {
    series: RwLock<HashMap<SeriesKey, SeriesBuffer>>,
    stats: RwLock<StoreStats>,
    offline: AtomicBool,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            stats: RwLock::new(StoreStats::default()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a datastore outage: every call fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(LogbookError::unavailable("point store offline"))
        } else {
            Ok(())
        }
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.series.read().values().map(|b| b.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryPointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PointStore for MemoryPointStore {
    async fn write_points(&self, points: Vec<Point>) -> Result<()> {
        self.check_online()?;
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len() as u64;
        {
            let mut series = self.series.write();
            for point in points {
                let key = SeriesKey {
                    measurement: point.measurement,
                    tags: point.tags,
                };
                series
                    .entry(key)
                    .or_default()
                    .add(point.timestamp, point.field);
            }
        }

        self.stats.write().points_written += count;
        Ok(())
    }

    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<(DateTime<Utc>, Value)>> {
        self.check_online()?;
        let series = self.series.read();

        let mut samples: Vec<(DateTime<Utc>, &FieldValue)> = series
            .iter()
            .filter(|(key, _)| {
                key.measurement == query.measurement && key.tags.context == query.context
            })
            .flat_map(|(_, buffer)| buffer.range_closed(query.grid.start(), query.grid.end()))
            .collect();
        samples.sort_by_key(|(ts, _)| *ts);

        let scanned = samples.len() as u64;
        let result = Downsampler::new(query.grid, query.method).downsample(samples);
        drop(series);

        let mut stats = self.stats.write();
        stats.queries_executed += 1;
        stats.points_scanned += scanned;
        Ok(result)
    }

    async fn raw(&self, query: &RawQuery) -> Result<Vec<Point>> {
        self.check_online()?;
        let series = self.series.read();

        let mut points: Vec<Point> = series
            .iter()
            .filter(|(key, _)| query.matches(&key.measurement, &key.tags))
            .flat_map(|(key, buffer)| {
                buffer
                    .samples
                    .iter()
                    .filter(|(ts, _)| query.contains(*ts))
                    .map(|(ts, field)| {
                        Point::new(key.measurement.clone(), *ts, key.tags.clone(), field.clone())
                    })
            })
            .collect();
        drop(series);

        points.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tags.cmp(&b.tags))
                .then_with(|| a.measurement.cmp(&b.measurement))
        });

        let mut stats = self.stats.write();
        stats.queries_executed += 1;
        stats.points_scanned += points.len() as u64;
        Ok(points)
    }

    async fn exists(&self, query: &RawQuery) -> Result<bool> {
        self.check_online()?;
        let series = self.series.read();
        Ok(series.iter().any(|(key, buffer)| {
            query.matches(&key.measurement, &key.tags)
                && buffer.samples.iter().any(|(ts, _)| query.contains(*ts))
        }))
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        self.check_online()?;
        let series = self.series.read();
        let contexts: BTreeSet<String> = series.keys().map(|k| k.tags.context.clone()).collect();
        Ok(contexts.into_iter().collect())
    }

    async fn measurements(&self, context: Option<&str>) -> Result<Vec<String>> {
        self.check_online()?;
        let series = self.series.read();
        let names: BTreeSet<String> = series
            .keys()
            .filter(|k| context.map_or(true, |c| k.tags.context == c))
            .map(|k| k.measurement.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}

// =============================================================================
// Series Buffer
// =============================================================================

/// Samples of one series, kept sorted by timestamp.
#[derive(Default)]
struct SeriesBuffer {
    samples: Vec<(DateTime<Utc>, FieldValue)>,
}

impl SeriesBuffer {
    fn add(&mut self, ts: DateTime<Utc>, field: FieldValue) {
        let idx = self.samples.partition_point(|(t, _)| *t <= ts);
        self.samples.insert(idx, (ts, field));
    }

    fn range_closed(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = (DateTime<Utc>, &FieldValue)> + '_ {
        let start = self.samples.partition_point(|(t, _)| *t < from);
        let end = self.samples.partition_point(|(t, _)| *t <= to);
        self.samples[start..end].iter().map(|(ts, f)| (*ts, f))
    }
}

// =============================================================================
// Store Statistics
// =============================================================================

/// Statistics for the point store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub points_written: u64,
    pub points_scanned: u64,
    pub queries_executed: u64,
}

// =============================================================================
// Tests
// =============================================================================
