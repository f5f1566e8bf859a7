//! Configuration for job directory backends

use crate::jobs::{mock_store::MockJobDirectory, sqlite_store::SqliteJobDirectory, JobDirectory, JobLookupError};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Available job directory backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum JobBackend {
    #[default]
    Sqlite,
    Mock,
}

impl std::str::FromStr for JobBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(JobBackend::Sqlite),
            "mock" | "memory" => Ok(JobBackend::Mock),
            _ => Err(format!("Unknown job backend: {}", s)),
        }
    }
}

/// Job directory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Job directory backend type
    #[serde(default)]
    pub backend: JobBackend,
    /// Database holding the `archive_jobs` table
    pub db_path: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            backend: JobBackend::default(),
            db_path: PathBuf::from("./data/archive.sqlite"),
        }
    }
}

impl JobsConfig {
    /// Create a job directory instance based on the configuration
    pub fn create_directory(&self) -> Result<Arc<dyn JobDirectory>, JobLookupError> {
        match self.backend {
            JobBackend::Sqlite => {
                info!("Creating SQLite job directory at {}", self.db_path.display());
                Ok(Arc::new(SqliteJobDirectory::open(&self.db_path)?))
            }
            JobBackend::Mock => {
                info!("Creating mock job directory");
                Ok(Arc::new(MockJobDirectory::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_backend_from_str() {
        assert_eq!("sqlite".parse::<JobBackend>().unwrap(), JobBackend::Sqlite);
        assert_eq!("SQLite".parse::<JobBackend>().unwrap(), JobBackend::Sqlite);
        assert_eq!("mock".parse::<JobBackend>().unwrap(), JobBackend::Mock);
        assert_eq!("MEMORY".parse::<JobBackend>().unwrap(), JobBackend::Mock);

        assert!("postgres".parse::<JobBackend>().is_err());
    }

    #[test]
    fn test_create_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = JobsConfig {
            backend: JobBackend::Sqlite,
            db_path: dir.path().join("jobs.sqlite"),
        };
        let jobs = sqlite.create_directory().unwrap();
        assert!(jobs.get_job(1).unwrap().is_none());

        let mock = JobsConfig { backend: JobBackend::Mock, ..JobsConfig::default() };
        let jobs = mock.create_directory().unwrap();
        assert!(jobs.get_job(1).unwrap().is_none());
    }
}
