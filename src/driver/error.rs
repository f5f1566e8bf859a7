use thiserror::Error;

/// Errors surfaced by archiving store drivers
///
/// Backend specific errors never cross the driver boundary; each driver maps
/// them onto one of these kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend failed to write, read or delete. Safe to retry after backoff.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The referenced object does not exist in the backend.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The handle belongs to another driver or is malformed.
    #[error("invalid file handle: {0}")]
    InvalidHandle(String),

    /// The driver does not offer this operation.
    #[error("driver {driver} does not support {operation}")]
    NotImplemented {
        driver: &'static str,
        operation: &'static str,
    },
}

impl StorageError {
    /// Short machine readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::StorageFailure(_) => "storage_failure",
            StorageError::NotFound(_) => "not_found",
            StorageError::InvalidHandle(_) => "invalid_handle",
            StorageError::NotImplemented { .. } => "not_implemented",
        }
    }
}

/// Result type for driver operations
pub type StorageResult<T> = Result<T, StorageError>;
