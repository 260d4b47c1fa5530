//! Error types for LogBloom

use crate::{FingerprintBounds, SegmentId};
use thiserror::Error;

/// Result type alias for LogBloom operations
pub type Result<T> = std::result::Result<T, BloomError>;

/// LogBloom error types
#[derive(Error, Debug)]
pub enum BloomError {
    /// A covering interval lies entirely outside the ownership range
    #[error("Range inconsistency: {bounds} does not overlap ownership range {ownership}")]
    RangeInconsistency {
        ownership: FingerprintBounds,
        bounds: FingerprintBounds,
    },

    /// A segment scheduled for planning is referenced by no meta
    #[error("Missing coverage: no meta references segment {0}")]
    MissingCoverage(SegmentId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    /// Metadata or block storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BloomError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, BloomError::Io(_) | BloomError::Storage(_))
    }

    /// Check if error means the input snapshot contradicts itself
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            BloomError::RangeInconsistency { .. } | BloomError::MissingCoverage(_)
        )
    }
}
