//! In-memory job directory for tests and the mock backend

use crate::jobs::{ArchiveJob, JobDirectory, JobId, JobLookupError};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of JobDirectory
#[derive(Default)]
pub struct MockJobDirectory {
    jobs: RwLock<HashMap<JobId, ArchiveJob>>,
}

impl MockJobDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job so drivers can resolve it
    pub fn insert(&self, job_id: JobId, context_id: i64) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(job_id, ArchiveJob { id: job_id, context_id });
        }
    }

    /// Forget a job
    pub fn remove(&self, job_id: JobId) -> bool {
        self.jobs
            .write()
            .map(|mut jobs| jobs.remove(&job_id).is_some())
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }
}

impl JobDirectory for MockJobDirectory {
    fn get_job(&self, job_id: JobId) -> Result<Option<ArchiveJob>, JobLookupError> {
        let jobs = self.jobs.read().map_err(|_| JobLookupError::Poisoned)?;
        Ok(jobs.get(&job_id).copied())
    }
}
