//! Logbook Path Specs
//!
//! Parsing of `path[:method]` column specs used by tabular history queries.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use logbook_common::{LogbookError, Result, POSITION_PATH};
use logbook_timeseries::AggregateMethod;
use serde::Serialize;

/// One requested column: a path and its aggregate method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSpec {
    pub path: String,
    pub method: AggregateMethod,
}

impl PathSpec {
    pub fn new(path: impl Into<String>, method: AggregateMethod) -> Self {
        let path = path.into();
        let method = if path == POSITION_PATH {
            AggregateMethod::First
        } else {
            method
        };
        Self { path, method }
    }

    /// Parse `path` or `path:method`. The position path always uses `first`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (path, method) = match raw.split_once(':') {
            Some((path, method)) => (path, AggregateMethod::parse(method)?),
            None => (raw, AggregateMethod::Average),
        };

        if !is_valid_path(path) {
            return Err(LogbookError::validation(format!("invalid path spec '{}'", raw)));
        }
        Ok(Self::new(path, method))
    }

    /// Parse a comma-separated list; at least one spec is required.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        let specs = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;

        if specs.is_empty() {
            return Err(LogbookError::validation("at least one path is required"));
        }
        Ok(specs)
    }
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}
