//! Logbook Sampling Encoder
//!
//! Turns incoming signal updates into persisted points. Applies type
//! dispatch onto the single-field point schema, per-(context, path)
//! decimation, path/context filtering and the composite path rules
//! (attitude decomposition, empty-path expansion).
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Duration, Utc};
use logbook_common::config::{FilterMode, RecorderConfig};
use logbook_common::{
    Delta, FieldValue, Point, PointTags, SignalUpdate, SignalValue, ATTITUDE_COMPONENTS,
    ATTITUDE_PATH, POSITION_PATH,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Path Filter
// =============================================================================

/// Include/exclude filter over signal paths. An empty list stores all.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    mode: FilterMode,
    paths: HashSet<String>,
}

impl PathFilter {
    pub fn new(mode: FilterMode, paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode,
            paths: paths.into_iter().collect(),
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        if self.paths.is_empty() {
            return true;
        }
        let listed = self.paths.contains(path);
        match self.mode {
            FilterMode::Whitelist => listed,
            FilterMode::Blacklist => !listed,
        }
    }
}

// =============================================================================
// Encoder Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub self_context: String,
    pub resolution: Duration,
    pub store_others: bool,
    pub filter: PathFilter,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

impl From<&RecorderConfig> for EncoderConfig {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            self_context: config.self_context.clone(),
            resolution: Duration::milliseconds(config.resolution_ms as i64),
            store_others: config.store_others,
            filter: PathFilter::new(config.filter_mode, config.filter_paths.iter().cloned()),
        }
    }
}

// =============================================================================
// Sampling Encoder
// =============================================================================

/// Decides whether and how each signal update is persisted.
pub struct SamplingEncoder {
    config: EncoderConfig,
    last_accepted: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl SamplingEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode a delta: normalize the self alias, then encode every value.
    pub fn encode_delta(&self, delta: &Delta) -> Vec<Point> {
        let mut delta = delta.clone();
        delta.normalize_context(&self.config.self_context);
        delta
            .signal_updates()
            .iter()
            .flat_map(|update| self.encode(update))
            .collect()
    }

    /// Encode one signal update into zero or more points.
    pub fn encode(&self, update: &SignalUpdate) -> Vec<Point> {
        if update.path == POSITION_PATH {
            return Vec::new();
        }
        if update.context != self.config.self_context && !self.config.store_others {
            return Vec::new();
        }

        let tags = PointTags::new(update.context.clone(), update.source.clone());

        if update.path.is_empty() {
            return self.expand(update, tags);
        }

        if update.path == ATTITUDE_PATH {
            let points = decompose_attitude(update, &tags);
            if points.is_empty() || !self.accept(&update.context, &update.path, update.timestamp) {
                return Vec::new();
            }
            return points;
        }

        if !self.config.filter.allows(&update.path) {
            return Vec::new();
        }

        let Some(field) = FieldValue::from_signal(&update.value) else {
            return Vec::new();
        };
        if !self.accept(&update.context, &update.path, update.timestamp) {
            return Vec::new();
        }

        vec![Point::new(update.path.clone(), update.timestamp, tags, field)]
    }

    // -------------------------------------------------------------------------
    // Composite Paths
    // -------------------------------------------------------------------------

    /// Expand an empty-path object into one point per member.
    fn expand(&self, update: &SignalUpdate, tags: PointTags) -> Vec<Point> {
        let Some(Value::Object(members)) = update.value.as_structured() else {
            return Vec::new();
        };

        members
            .iter()
            .filter(|(key, _)| !key.is_empty() && self.config.filter.allows(key))
            .filter_map(|(key, value)| {
                let field = FieldValue::from_signal(&SignalValue::from(value.clone()))?;
                Some(Point::new(key.clone(), update.timestamp, tags.clone(), field))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Decimation
    // -------------------------------------------------------------------------

    /// Check-and-set the decimation gate for a (context, path) pair.
    fn accept(&self, context: &str, path: &str, timestamp: DateTime<Utc>) -> bool {
        let mut last_accepted = self.last_accepted.lock();
        let key = (context.to_string(), path.to_string());

        if let Some(last) = last_accepted.get(&key) {
            if timestamp - *last <= self.config.resolution {
                return false;
            }
        }
        last_accepted.insert(key, timestamp);
        true
    }

    /// Number of (context, path) pairs with decimation state.
    pub fn tracked_pairs(&self) -> usize {
        self.last_accepted.lock().len()
    }
}

/// Split attitude into numeric pitch/roll/yaw sub-points.
fn decompose_attitude(update: &SignalUpdate, tags: &PointTags) -> Vec<Point> {
    let Some(Value::Object(members)) = update.value.as_structured() else {
        return Vec::new();
    };

    ATTITUDE_COMPONENTS
        .iter()
        .filter_map(|component| {
            let value = members.get(*component)?.as_f64()?;
            if !value.is_finite() {
                return None;
            }
            Some(Point::number(
                format!("{}.{}", ATTITUDE_PATH, component),
                update.timestamp,
                tags.clone(),
                value,
            ))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
