//! Logbook Time Series Aggregation
//!
//! Aggregate methods and the bucket grid used for windowed group-by queries.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Duration, Utc};
use logbook_common::{FieldValue, LogbookError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Aggregate Method
// =============================================================================

/// Aggregation applied to each time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMethod {
    #[default]
    Average,
    Min,
    Max,
    First,
}

impl AggregateMethod {
    /// Parse a method name as used in path specs.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(Self::Average),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "first" => Ok(Self::First),
            other => Err(LogbookError::validation(format!(
                "unknown aggregate method '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
        }
    }

    /// True for methods that only read the numeric field.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::First)
    }
}

impl std::fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Streaming aggregator over the fields of one bucket.
///
/// Numeric methods skip fields that are not `value`; `first` keeps the first
/// field of any type and decodes it.
pub struct Aggregator {
    method: AggregateMethod,
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    first: Option<FieldValue>,
}

impl Aggregator {
    pub fn new(method: AggregateMethod) -> Self {
        Self {
            method,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            first: None,
        }
    }

    /// Add a field to the aggregator.
    pub fn add(&mut self, field: &FieldValue) {
        if self.method == AggregateMethod::First {
            if self.first.is_none() {
                self.first = Some(field.clone());
            }
            return;
        }

        if let Some(value) = field.as_f64() {
            self.count += 1;
            self.sum += value;
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    /// Get the current aggregate as a decoded JSON value.
    pub fn value(&self) -> Option<Value> {
        let number = match self.method {
            AggregateMethod::First => return self.first.as_ref().map(FieldValue::decode),
            _ if self.count == 0 => return None,
            AggregateMethod::Average => self.sum / self.count as f64,
            AggregateMethod::Min => self.min,
            AggregateMethod::Max => self.max,
        };
        serde_json::Number::from_f64(number).map(Value::Number)
    }

    /// Reset the aggregator.
    pub fn reset(&mut self) {
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.first = None;
    }
}

// =============================================================================
// Bucket Grid
// =============================================================================

/// Fixed-width buckets anchored at `from` over the closed window `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGrid {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    width_ms: i64,
    count: usize,
}

impl BucketGrid {
    /// Create a grid; `to` must be after `from` and `width` positive.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, width: Duration) -> Result<Self> {
        let width_ms = width.num_milliseconds();
        if width_ms <= 0 {
            return Err(LogbookError::validation("resolution must be positive"));
        }
        if from >= to {
            return Err(LogbookError::validation("from must be before to"));
        }

        let span_ms = (to - from).num_milliseconds();
        let count = (span_ms / width_ms + i64::from(span_ms % width_ms != 0)).max(1) as usize;
        Ok(Self {
            from,
            to,
            width_ms,
            count,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn width(&self) -> Duration {
        Duration::milliseconds(self.width_ms)
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bucket holding `ts`, or `None` outside `[from, to]`. A sample at
    /// exactly `to` falls into the last bucket.
    pub fn index_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        if ts < self.from || ts > self.to {
            return None;
        }
        let offset = (ts - self.from).num_milliseconds() / self.width_ms;
        Some((offset as usize).min(self.count - 1))
    }

    /// Start timestamp of bucket `index`.
    pub fn start_of(&self, index: usize) -> DateTime<Utc> {
        self.from + Duration::milliseconds(self.width_ms * index as i64)
    }
}

// =============================================================================
// Downsampler
// =============================================================================

/// Downsamples timestamped fields onto a bucket grid.
pub struct Downsampler {
    grid: BucketGrid,
    method: AggregateMethod,
}

impl Downsampler {
    pub fn new(grid: BucketGrid, method: AggregateMethod) -> Self {
        Self { grid, method }
    }

    /// Aggregate samples (any order) into `(bucket start, value)` pairs in
    /// ascending time. Buckets without a result are omitted.
    pub fn downsample<'a, I>(&self, samples: I) -> Vec<(DateTime<Utc>, Value)>
    where
        I: IntoIterator<Item = (DateTime<Utc>, &'a FieldValue)>,
    {
        let mut ordered: Vec<(usize, DateTime<Utc>, &FieldValue)> = samples
            .into_iter()
            .filter_map(|(ts, field)| self.grid.index_of(ts).map(|idx| (idx, ts, field)))
            .collect();
        ordered.sort_by_key(|(idx, ts, _)| (*idx, *ts));

        let mut result = Vec::new();
        let mut current: Option<usize> = None;
        let mut aggregator = Aggregator::new(self.method);

        for (idx, _, field) in ordered {
            if Some(idx) != current {
                if let Some(bucket) = current {
                    if let Some(value) = aggregator.value() {
                        result.push((self.grid.start_of(bucket), value));
                    }
                }
                current = Some(idx);
                aggregator.reset();
            }
            aggregator.add(field);
        }

        if let Some(bucket) = current {
            if let Some(value) = aggregator.value() {
                result.push((self.grid.start_of(bucket), value));
            }
        }

        result
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid base time")
    }

    #[test]
    fn test_parse_methods() {
        assert_eq!(AggregateMethod::parse("average").unwrap(), AggregateMethod::Average);
        assert_eq!(AggregateMethod::parse("MAX").unwrap(), AggregateMethod::Max);
        assert_eq!(AggregateMethod::parse("first").unwrap(), AggregateMethod::First);
        assert!(AggregateMethod::parse("median").unwrap_err().is_user_error());
    }

    #[test]
    fn test_aggregator_skips_non_numeric() {
        let mut agg = Aggregator::new(AggregateMethod::Average);
        agg.add(&FieldValue::Value(10.0));
        agg.add(&FieldValue::StringValue("x".into()));
        agg.add(&FieldValue::Value(20.0));
        assert_eq!(agg.value(), Some(json!(15.0)));

        let mut agg = Aggregator::new(AggregateMethod::Max);
        agg.add(&FieldValue::BoolValue(true));
        assert_eq!(agg.value(), None);
    }

    #[test]
    fn test_aggregator_first_decodes() {
        let mut agg = Aggregator::new(AggregateMethod::First);
        agg.add(&FieldValue::JsonValue("{\"a\":1}".into()));
        agg.add(&FieldValue::Value(3.0));
        assert_eq!(agg.value(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_grid_closed_window() {
        let from = base();
        let to = from + Duration::seconds(10);
        let grid = BucketGrid::new(from, to, Duration::seconds(5)).unwrap();

        assert_eq!(grid.len(), 2);
        assert_eq!(grid.index_of(from), Some(0));
        assert_eq!(grid.index_of(from + Duration::seconds(5)), Some(1));
        assert_eq!(grid.index_of(to), Some(1));
        assert_eq!(grid.index_of(to + Duration::milliseconds(1)), None);
        assert_eq!(grid.start_of(1), from + Duration::seconds(5));
    }

    #[test]
    fn test_grid_rounds_up() {
        let from = base();
        let grid = BucketGrid::new(from, from + Duration::seconds(11), Duration::seconds(5)).unwrap();
        assert_eq!(grid.len(), 3);

        let wide = BucketGrid::new(from, from + Duration::seconds(1), Duration::hours(1)).unwrap();
        assert_eq!(wide.len(), 1);
    }

    #[test]
    fn test_grid_huge_width() {
        let from = base();
        let grid = BucketGrid::new(from, from + Duration::days(1), Duration::milliseconds(i64::MAX)).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.index_of(from + Duration::hours(12)), Some(0));
    }

    #[test]
    fn test_grid_validation() {
        let from = base();
        assert!(BucketGrid::new(from, from, Duration::seconds(1)).is_err());
        assert!(BucketGrid::new(from, from + Duration::seconds(1), Duration::zero()).is_err());
    }

    #[test]
    fn test_downsampler() {
        let from = base();
        let grid = BucketGrid::new(from, from + Duration::seconds(100), Duration::seconds(10)).unwrap();
        let fields: Vec<(DateTime<Utc>, FieldValue)> = (0..100)
            .map(|i| (from + Duration::seconds(i), FieldValue::Value(i as f64)))
            .collect();

        let result = Downsampler::new(grid, AggregateMethod::Average)
            .downsample(fields.iter().map(|(ts, f)| (*ts, f)));

        assert_eq!(result.len(), 10);
        assert_eq!(result[0], (from, json!(4.5)));
    }
}
