//! Error types for Planche

use crate::RowId;
use thiserror::Error;

/// Core error type for Planche operations
#[derive(Error, Debug)]
pub enum PlancheError {
    #[error("Host error: {0}")]
    Host(String),

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Reference unresolvable: {0}")]
    ReferenceUnresolvable(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Invalid split point for row {id}")]
    InvalidSplitPoint { id: RowId },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for Planche operations
pub type Result<T> = std::result::Result<T, PlancheError>;
