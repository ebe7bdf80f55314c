use planche_core::PlancheError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-facing messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Table load failed: {0}")]
    TableLoadFailed(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("No column mapping received yet")]
    NotMapped,

    #[error(transparent)]
    Core(#[from] PlancheError),
}
