//! Archive job lookup
//!
//! Jobs are owned by the surrounding archiving system. Drivers only need to
//! resolve a job id to the context it belongs to, so placement can be scoped
//! per context.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an archive job in the external job store
pub type JobId = i64;

/// The slice of an archive job a storage driver cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveJob {
    /// Job identifier
    pub id: JobId,
    /// Context (course, tenant, ...) the job archives
    pub context_id: i64,
}

/// Errors raised while looking up jobs
#[derive(Debug, Error)]
pub enum JobLookupError {
    #[error("job database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("job database path unusable: {0}")]
    Io(#[from] std::io::Error),

    #[error("job directory lock poisoned")]
    Poisoned,
}

/// Read access to the external job store
pub trait JobDirectory: Send + Sync {
    /// Look up a job. `Ok(None)` means the job does not exist.
    fn get_job(&self, job_id: JobId) -> Result<Option<ArchiveJob>, JobLookupError>;
}
