//! Error types for the ETL pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for the ETL pipeline
///
/// Transform-level and per-record load failures are handled inside the
/// pipeline run; only source/target/state failures propagate to callers.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("checkpoint state corrupted: {0}")]
    StateCorruption(String),

    #[error("transform failed for record {id}: {reason}")]
    Transform { id: String, reason: String },

    #[error("target index unavailable: {0}")]
    TargetUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single record the target index rejected during a bulk load.
///
/// Carries the record id plus the index-reported reason; the full payload is
/// not retained. These are reported, never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    /// Id of the rejected record
    pub id: String,
    /// Reason reported by the index for this record
    pub reason: String,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record {} rejected: {}", self.id, self.reason)
    }
}
