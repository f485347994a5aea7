//! Logbook Utils - Utility Functions
//!
//! Duration string parsing and timestamp formatting shared by the query
//! surface and the reconstructors.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{LogbookError, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

// =============================================================================
// Duration Strings
// =============================================================================

/// Parse `N` followed by a unit in {s, m, h, d, w}, e.g. `"15m"`.
pub fn parse_duration_spec(spec: &str) -> Result<Duration> {
    let spec = spec.trim();
    let invalid = || LogbookError::validation(format!("invalid duration '{}'", spec));

    let unit = spec.chars().last().ok_or_else(invalid)?;
    let amount: i64 = spec[..spec.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let duration = match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'w' => Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

// =============================================================================
// Timestamps
// =============================================================================

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LogbookError::validation(format!("invalid timestamp '{}': {}", raw, e)))
}

// =============================================================================
// Tests
// =============================================================================
