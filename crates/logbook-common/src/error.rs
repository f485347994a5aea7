//! Logbook Error - Unified Error Types
//!
//! Error handling shared by every Logbook component. Errors are grouped by
//! who can act on them: callers (validation), operators (datastore outages,
//! configuration) and developers (internal faults).
//!
//! Key Features:
//! - Validation errors carry a message suitable for API callers
//! - Datastore outages are distinguishable from storage faults
//! - User vs system error classification for HTTP status mapping
//! - Seamless integration with std::io::Error and serde_json::Error
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Logbook operations.
#[derive(Error, Debug)]
pub enum LogbookError {
    // Caller errors
    #[error("validation error: {0}")]
    Validation(String),

    // Datastore errors
    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Logbook operations.
pub type Result<T> = std::result::Result<T, LogbookError>;

// =============================================================================
// Constructors
// =============================================================================

impl LogbookError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        LogbookError::Validation(msg.into())
    }

    /// Shorthand for a datastore that cannot be reached.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        LogbookError::DatastoreUnavailable(msg.into())
    }

    /// Shorthand for a storage fault.
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        LogbookError::Storage(msg.to_string())
    }

    /// Shorthand for a fault in Logbook itself.
    pub fn internal(msg: impl Into<String>) -> Self {
        LogbookError::Internal(msg.into())
    }
}

impl From<serde_json::Error> for LogbookError {
    fn from(err: serde_json::Error) -> Self {
        LogbookError::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl LogbookError {
    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogbookError::DatastoreUnavailable(_) | LogbookError::Io(_))
    }

    /// Returns true if this is a user error (vs system error).
    pub fn is_user_error(&self) -> bool {
        matches!(self, LogbookError::Validation(_))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LogbookError::validation("bad bbox").is_user_error());
        assert!(!LogbookError::validation("bad bbox").is_retryable());

        let outage = LogbookError::unavailable("store offline");
        assert!(outage.is_retryable());
        assert!(!outage.is_user_error());
    }

    #[test]
    fn test_internal_is_system_error() {
        let err = LogbookError::internal("task panicked");
        assert!(!err.is_user_error());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "internal error: task panicked");
    }

    #[test]
    fn test_display() {
        let err = LogbookError::validation("from must be before to");
        assert_eq!(err.to_string(), "validation error: from must be before to");
    }

    #[test]
    fn test_from_serde_json() {
        let err: LogbookError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, LogbookError::Serialization(_)));
    }
}
