//! Logbook History Reconstructor
//!
//! Inverts the point encoding. Tabular queries aggregate each requested path
//! onto a shared bucket grid and join the results into sparse rows; legacy
//! queries rebuild delta envelopes from raw rows, re-merging attitude
//! components and re-wrapping bare paths.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::spec::PathSpec;
use chrono::{DateTime, Duration, Utc};
use logbook_common::config::{HistoryConfig, PlaybackConfig, RecorderConfig};
use logbook_common::utils::format_timestamp;
use logbook_common::{
    is_bare_path, Delta, LogbookError, PathValue, Point, Position, Result, SignalValue, Update,
    ATTITUDE_PATH, POSITION_PATH, SELF_CONTEXT_ALIAS,
};
use logbook_timeseries::{AggregateMethod, AggregateQuery, BucketGrid, PointStore, RawQuery};
use logbook_tracks::{TrackPoint, TrackStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// =============================================================================
// Result Types
// =============================================================================

/// Column-oriented result of a tabular history query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuesResult {
    pub context: String,
    pub range: TimeRange,
    pub values: Vec<ValueColumn>,
    /// Rows of `[timestamp, v1, v2, ...]`.
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueColumn {
    pub path: String,
    pub method: AggregateMethod,
    pub source: Option<String>,
}

// =============================================================================
// Reconstructor Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    pub self_context: String,
    pub default_points: u32,
    pub snapshot_lookback: Duration,
    pub probe_window: Duration,
}

impl ReconstructorConfig {
    pub fn new(recorder: &RecorderConfig, history: &HistoryConfig, playback: &PlaybackConfig) -> Self {
        Self {
            self_context: recorder.self_context.clone(),
            default_points: history.default_points.max(1),
            snapshot_lookback: Duration::seconds(history.snapshot_lookback_secs as i64),
            probe_window: Duration::seconds(playback.probe_secs as i64),
        }
    }
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self::new(
            &RecorderConfig::default(),
            &HistoryConfig::default(),
            &PlaybackConfig::default(),
        )
    }
}

// =============================================================================
// History Reconstructor
// =============================================================================

/// Read side of the point and track stores.
pub struct HistoryReconstructor {
    config: ReconstructorConfig,
    points: Arc<dyn PointStore>,
    tracks: Arc<dyn TrackStore>,
}

impl HistoryReconstructor {
    pub fn new(
        config: ReconstructorConfig,
        points: Arc<dyn PointStore>,
        tracks: Arc<dyn TrackStore>,
    ) -> Self {
        Self {
            config,
            points,
            tracks,
        }
    }

    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    fn resolve_context(&self, context: Option<&str>) -> String {
        match context {
            None | Some(SELF_CONTEXT_ALIAS) => self.config.self_context.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Whether a legacy context selection includes the self context.
    fn selects_self(&self, context: Option<&str>) -> bool {
        match context {
            None | Some(SELF_CONTEXT_ALIAS) => true,
            Some(other) => other == self.config.self_context,
        }
    }

    // -------------------------------------------------------------------------
    // Tabular Reconstruction
    // -------------------------------------------------------------------------

    /// Aggregate `specs` over `[from, to]` into sparse rows.
    pub async fn reconstruct(
        &self,
        context: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        specs: &[PathSpec],
        resolution_ms: Option<i64>,
    ) -> Result<ValuesResult> {
        if from >= to {
            return Err(LogbookError::validation("from must be before to"));
        }
        if specs.is_empty() {
            return Err(LogbookError::validation("at least one path is required"));
        }

        let resolution = match resolution_ms {
            Some(ms) if ms <= 0 => {
                return Err(LogbookError::validation("resolution must be positive"));
            }
            Some(ms) => Duration::milliseconds(ms),
            None => {
                let ms = (to - from).num_milliseconds() / i64::from(self.config.default_points);
                Duration::milliseconds(ms.max(1))
            }
        };

        let context = self.resolve_context(context);
        let grid = BucketGrid::new(from, to, resolution)?;
        let width = specs.len() + 1;
        let mut rows: BTreeMap<DateTime<Utc>, Vec<Value>> = BTreeMap::new();

        for (column, spec) in specs.iter().enumerate() {
            let series = if spec.path == POSITION_PATH {
                self.position_column(&context, &grid).await?
            } else {
                self.points
                    .aggregate(&AggregateQuery {
                        measurement: spec.path.clone(),
                        context: context.clone(),
                        grid,
                        method: spec.method,
                    })
                    .await?
            };

            for (ts, value) in series {
                let row = rows.entry(ts).or_insert_with(|| vec![Value::Null; width]);
                row[column + 1] = value;
            }
        }

        let data = rows
            .into_iter()
            .map(|(ts, mut row)| {
                row[0] = Value::String(format_timestamp(ts));
                row
            })
            .collect();

        Ok(ValuesResult {
            context,
            range: TimeRange {
                from: format_timestamp(from),
                to: format_timestamp(to),
            },
            values: specs
                .iter()
                .map(|spec| ValueColumn {
                    path: spec.path.clone(),
                    method: spec.method,
                    source: None,
                })
                .collect(),
            data,
        })
    }

    /// First `[longitude, latitude]` per bucket from the track store.
    async fn position_column(
        &self,
        context: &str,
        grid: &BucketGrid,
    ) -> Result<Vec<(DateTime<Utc>, Value)>> {
        if context != self.config.self_context {
            return Ok(Vec::new());
        }

        let positions = self.tracks.positions(grid.start(), grid.end()).await?;
        let mut column: Vec<(DateTime<Utc>, Value)> = Vec::new();
        let mut last_bucket = None;
        for point in positions {
            let Some(idx) = grid.index_of(point.timestamp) else {
                continue;
            };
            if last_bucket != Some(idx) {
                last_bucket = Some(idx);
                column.push((
                    grid.start_of(idx),
                    serde_json::json!([point.longitude, point.latitude]),
                ));
            }
        }
        Ok(column)
    }

    // -------------------------------------------------------------------------
    // Legacy Reconstruction
    // -------------------------------------------------------------------------

    /// Delta envelopes for raw rows in `(from, to]`, ordered by time.
    ///
    /// `context`: `None` selects all contexts, `vessels.self` the self
    /// context, anything else one exact context.
    pub async fn legacy_deltas(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        context: Option<&str>,
    ) -> Result<Vec<Delta>> {
        let mut query = RawQuery::new(from, to);
        if let Some(ctx) = context {
            query = query.with_context(self.resolve_context(Some(ctx)));
        }

        let rows = self.points.raw(&query).await?;
        let mut deltas = assemble_deltas(rows);

        if self.selects_self(context) {
            let positions = self.tracks.positions(from, to).await?;
            deltas.extend(
                positions
                    .into_iter()
                    .filter(|p| p.timestamp > from)
                    .map(|p| self.position_delta(&p)),
            );
        }

        deltas.sort_by_key(|d| d.first_timestamp());
        Ok(deltas)
    }

    /// State as of `at`: the latest row per (context, measurement) within
    /// the lookback window, assembled into deltas.
    pub async fn snapshot(&self, at: DateTime<Utc>, context: Option<&str>) -> Result<Vec<Delta>> {
        let from = at - self.config.snapshot_lookback;
        let mut query = RawQuery::new(from, at);
        if let Some(ctx) = context {
            query = query.with_context(self.resolve_context(Some(ctx)));
        }

        let rows = self.points.raw(&query).await?;
        let mut latest: HashMap<(String, String), Point> = HashMap::new();
        for row in rows {
            // rows are time-ordered, so later rows overwrite earlier ones
            latest.insert((row.tags.context.clone(), row.measurement.clone()), row);
        }
        let mut latest: Vec<Point> = latest.into_values().collect();
        latest.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.tags.cmp(&b.tags)));

        let mut deltas = assemble_deltas(latest);
        if self.selects_self(context) {
            let positions = self.tracks.positions(from, at).await?;
            if let Some(last) = positions.iter().filter(|p| p.timestamp > from).last() {
                deltas.push(self.position_delta(last));
            }
        }

        deltas.sort_by_key(|d| d.first_timestamp());
        Ok(deltas)
    }

    fn position_delta(&self, point: &TrackPoint) -> Delta {
        let position = Position::new(point.latitude, point.longitude);
        Delta::new(self.config.self_context.clone()).with_update(
            Update::new(point.timestamp, "")
                .with_value(POSITION_PATH, SignalValue::Structured(position.to_value())),
        )
    }

    // -------------------------------------------------------------------------
    // Discovery
    // -------------------------------------------------------------------------

    async fn has_track_data(&self) -> Result<bool> {
        Ok(!self.tracks.tracks().await?.is_empty())
    }

    /// Distinct contexts with stored data.
    pub async fn contexts(&self) -> Result<Vec<String>> {
        let mut contexts = self.points.contexts().await?;
        if self.has_track_data().await? && !contexts.contains(&self.config.self_context) {
            contexts.push(self.config.self_context.clone());
            contexts.sort();
        }
        Ok(contexts)
    }

    /// Distinct paths with stored data, optionally for one context.
    pub async fn paths(&self, context: Option<&str>) -> Result<Vec<String>> {
        let resolved = context.map(|c| self.resolve_context(Some(c)));
        let mut paths = self.points.measurements(resolved.as_deref()).await?;

        let includes_self = resolved.as_deref().map_or(true, |c| c == self.config.self_context);
        if includes_self && self.has_track_data().await? && !paths.iter().any(|p| p == POSITION_PATH) {
            paths.push(POSITION_PATH.to_string());
            paths.sort();
        }
        Ok(paths)
    }

    /// Quick probe over `[start, start + probe window]` in both stores.
    /// Failures are logged and reported as no data.
    pub async fn has_any_data(&self, start: DateTime<Utc>, context: Option<&str>) -> bool {
        let end = start + self.config.probe_window;
        let mut query = RawQuery::new(start - Duration::milliseconds(1), end);
        if let Some(ctx) = context {
            query = query.with_context(self.resolve_context(Some(ctx)));
        }

        match self.points.exists(&query).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(start = %start, error = %e, "point store probe failed");
                return false;
            }
        }

        if !self.selects_self(context) {
            return false;
        }
        match self.tracks.has_positions(start, end).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(start = %start, error = %e, "track store probe failed");
                false
            }
        }
    }
}

// =============================================================================
// Delta Assembly
// =============================================================================

/// Group time-ordered rows into one delta per (timestamp, context, source).
fn assemble_deltas(rows: Vec<Point>) -> Vec<Delta> {
    struct Group {
        context: String,
        update: Update,
        attitude: Map<String, Value>,
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<(DateTime<Utc>, String, String), usize> = HashMap::new();

    for row in rows {
        let key = (row.timestamp, row.tags.context.clone(), row.tags.source.clone());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                context: row.tags.context.clone(),
                update: Update::new(row.timestamp, row.tags.source.clone()),
                attitude: Map::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        let value = row.field.decode();
        let component = row
            .measurement
            .strip_prefix(ATTITUDE_PATH)
            .and_then(|rest| rest.strip_prefix('.'))
            .map(str::to_string);

        if let Some(component) = component {
            group.attitude.insert(component, value);
        } else if is_bare_path(&row.measurement) {
            let mut wrapped = Map::new();
            wrapped.insert(row.measurement, value);
            group.update.values.push(PathValue {
                path: String::new(),
                value: SignalValue::Structured(Value::Object(wrapped)),
            });
        } else {
            group.update.values.push(PathValue {
                path: row.measurement,
                value: SignalValue::from(value),
            });
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let mut update = group.update;
            if !group.attitude.is_empty() {
                update = update.with_value(
                    ATTITUDE_PATH,
                    SignalValue::Structured(Value::Object(group.attitude)),
                );
            }
            Delta::new(group.context).with_update(update)
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
