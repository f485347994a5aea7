//! Logbook Common - Shared Types and Utilities
//!
//! Foundational types, error handling and configuration used by every
//! Logbook component. Holds the encoding contract between the write side
//! (encoder, track segmenter) and the read side (reconstructor, track
//! query engine).
//!
//! Key Features:
//! - Unified error type with user/system classification
//! - Signal, delta and point data model
//! - Configuration structures for all components
//! - Duration and timestamp helpers
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::{LogbookError, Result};
pub use types::*;
