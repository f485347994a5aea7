//! Logbook Types - Signal and Point Data Model
//!
//! The encoding contract shared by the write side (encoder, segmenter) and
//! the read side (reconstructor, track engine): incoming deltas and signal
//! updates, and the points persisted for them.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Well-Known Paths
// =============================================================================

/// Path carrying vessel position as `{latitude, longitude}`.
pub const POSITION_PATH: &str = "navigation.position";

/// Composite path decomposed into pitch/roll/yaw points.
pub const ATTITUDE_PATH: &str = "navigation.attitude";

/// Attitude members stored as individual sub-points.
pub const ATTITUDE_COMPONENTS: [&str; 3] = ["pitch", "roll", "yaw"];

/// Context alias for the local vessel.
pub const SELF_CONTEXT_ALIAS: &str = "vessels.self";

/// A path with no hierarchy (no `.`), as produced by empty-path expansion.
pub fn is_bare_path(path: &str) -> bool {
    !path.is_empty() && !path.contains('.')
}

// =============================================================================
// Signal Value
// =============================================================================

/// Value carried by a signal update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum SignalValue {
    Number(f64),
    Text(String),
    Flag(bool),
    /// Anything that is not a number, string or boolean.
    Structured(Value),
}

impl SignalValue {
    /// Returns the structured payload, if any.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            SignalValue::Structured(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for SignalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(f) => SignalValue::Number(f),
                None => SignalValue::Structured(Value::Number(n)),
            },
            Value::String(s) => SignalValue::Text(s),
            Value::Bool(b) => SignalValue::Flag(b),
            other => SignalValue::Structured(other),
        }
    }
}

impl From<SignalValue> for Value {
    fn from(value: SignalValue) -> Self {
        match value {
            SignalValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SignalValue::Text(s) => Value::String(s),
            SignalValue::Flag(b) => Value::Bool(b),
            SignalValue::Structured(v) => v,
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// A decoded geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Decode `{latitude, longitude}`; both members must be finite numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        let latitude = value.get("latitude")?.as_f64()?;
        let longitude = value.get("longitude")?.as_f64()?;
        if latitude.is_finite() && longitude.is_finite() {
            Some(Self { latitude, longitude })
        } else {
            None
        }
    }

    /// GeoJSON coordinate order.
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "latitude": self.latitude, "longitude": self.longitude })
    }
}

// =============================================================================
// Signal Update
// =============================================================================

/// One timestamped value for one path in one context.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalUpdate {
    pub context: String,
    pub path: String,
    pub value: SignalValue,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl SignalUpdate {
    pub fn new(
        context: impl Into<String>,
        path: impl Into<String>,
        value: SignalValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            context: context.into(),
            path: path.into(),
            value,
            timestamp,
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

// =============================================================================
// Delta Envelope
// =============================================================================

/// Envelope of timestamped updates for a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub context: String,
    #[serde(default)]
    pub updates: Vec<Update>,
}

/// One timestamped group of values from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "$source", default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default)]
    pub values: Vec<PathValue>,
}

/// A path/value pair inside an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    pub value: SignalValue,
}

impl Update {
    pub fn new(timestamp: DateTime<Utc>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            timestamp,
            source_label: (!source.is_empty()).then_some(source),
            source: None,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, path: impl Into<String>, value: SignalValue) -> Self {
        self.values.push(PathValue {
            path: path.into(),
            value,
        });
        self
    }

    /// Source tag for points written from this update.
    pub fn source_tag(&self) -> String {
        if let Some(label) = &self.source_label {
            return label.clone();
        }
        match &self.source {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

impl Delta {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            updates: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: Update) -> Self {
        self.updates.push(update);
        self
    }

    /// Replace the `vessels.self` alias with the concrete self context.
    pub fn normalize_context(&mut self, self_context: &str) {
        if self.context == SELF_CONTEXT_ALIAS {
            self.context = self_context.to_string();
        }
    }

    /// Flatten into one signal update per value.
    pub fn signal_updates(&self) -> Vec<SignalUpdate> {
        self.updates
            .iter()
            .flat_map(|update| {
                let source = update.source_tag();
                update.values.iter().map(move |pv| SignalUpdate {
                    context: self.context.clone(),
                    path: pv.path.clone(),
                    value: pv.value.clone(),
                    timestamp: update.timestamp,
                    source: source.clone(),
                })
            })
            .collect()
    }

    /// Earliest update timestamp, used to order reconstructed deltas.
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updates.iter().map(|u| u.timestamp).min()
    }
}

// =============================================================================
// Point
// =============================================================================

/// Tags attached to every persisted point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointTags {
    pub context: String,
    pub source: String,
}

impl PointTags {
    pub fn new(context: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// The single populated field of a point. The variant is the field key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    Value(f64),
    StringValue(String),
    BoolValue(bool),
    JsonValue(String),
}

impl FieldValue {
    /// Select the field for a signal value. NaN numbers yield `None`.
    pub fn from_signal(value: &SignalValue) -> Option<Self> {
        match value {
            SignalValue::Number(n) if n.is_nan() => None,
            SignalValue::Number(n) => Some(FieldValue::Value(*n)),
            SignalValue::Text(s) => Some(FieldValue::StringValue(s.clone())),
            SignalValue::Flag(b) => Some(FieldValue::BoolValue(*b)),
            SignalValue::Structured(v) => Some(FieldValue::JsonValue(v.to_string())),
        }
    }

    /// Stored field name.
    pub fn key(&self) -> &'static str {
        match self {
            FieldValue::Value(_) => "value",
            FieldValue::StringValue(_) => "stringValue",
            FieldValue::BoolValue(_) => "boolValue",
            FieldValue::JsonValue(_) => "jsonValue",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Value(n) => Some(*n),
            _ => None,
        }
    }

    /// Decode back into a JSON value according to the populated key.
    pub fn decode(&self) -> Value {
        match self {
            FieldValue::Value(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::StringValue(s) => Value::String(s.clone()),
            FieldValue::BoolValue(b) => Value::Bool(*b),
            FieldValue::JsonValue(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
        }
    }
}

/// One persisted time-series sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,
    pub timestamp: DateTime<Utc>,
    pub tags: PointTags,
    #[serde(rename = "fields")]
    pub field: FieldValue,
}

impl Point {
    pub fn new(
        measurement: impl Into<String>,
        timestamp: DateTime<Utc>,
        tags: PointTags,
        field: FieldValue,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp,
            tags,
            field,
        }
    }

    /// Convenience constructor for numeric points.
    pub fn number(
        measurement: impl Into<String>,
        timestamp: DateTime<Utc>,
        tags: PointTags,
        value: f64,
    ) -> Self {
        Self::new(measurement, timestamp, tags, FieldValue::Value(value))
    }
}

// =============================================================================
// Tests
// =============================================================================
