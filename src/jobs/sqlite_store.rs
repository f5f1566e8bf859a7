//! SQLite-backed job directory
//!
//! Reads the `archive_jobs` table the archiving system maintains. The table is
//! created on open so a fresh database is usable for provisioning and tests.

use crate::jobs::{ArchiveJob, JobDirectory, JobId, JobLookupError};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite implementation of JobDirectory
pub struct SqliteJobDirectory {
    conn: Mutex<Connection>,
}

impl SqliteJobDirectory {
    /// Open (or create) the job database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, JobLookupError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn, db_path.display().to_string())
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, JobLookupError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, JobLookupError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS archive_jobs (
                id INTEGER PRIMARY KEY,
                context_id INTEGER NOT NULL
            )",
            [],
        )?;
        info!("Opened job directory at {}", location);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert or update a job row
    pub fn register_job(&self, job_id: JobId, context_id: i64) -> Result<(), JobLookupError> {
        let conn = self.conn.lock().map_err(|_| JobLookupError::Poisoned)?;
        conn.execute(
            "INSERT INTO archive_jobs (id, context_id) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET context_id = excluded.context_id",
            params![job_id, context_id],
        )?;
        Ok(())
    }
}

impl JobDirectory for SqliteJobDirectory {
    fn get_job(&self, job_id: JobId) -> Result<Option<ArchiveJob>, JobLookupError> {
        let conn = self.conn.lock().map_err(|_| JobLookupError::Poisoned)?;
        let job = conn
            .query_row(
                "SELECT id, context_id FROM archive_jobs WHERE id = ?1",
                params![job_id],
                |row| {
                    Ok(ArchiveJob {
                        id: row.get(0)?,
                        context_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_job_directory_register_and_lookup() {
        let jobs = SqliteJobDirectory::open_in_memory().unwrap();
        assert!(jobs.get_job(42).unwrap().is_none());

        jobs.register_job(42, 3).unwrap();
        assert_eq!(jobs.get_job(42).unwrap(), Some(ArchiveJob { id: 42, context_id: 3 }));

        // Re-registering moves the job to the new context
        jobs.register_job(42, 9).unwrap();
        assert_eq!(jobs.get_job(42).unwrap().unwrap().context_id, 9);
    }

    #[test]
    fn test_sqlite_job_directory_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("jobs.sqlite");

        {
            let jobs = SqliteJobDirectory::open(&db_path).unwrap();
            jobs.register_job(7, 70).unwrap();
        }

        let reopened = SqliteJobDirectory::open(&db_path).unwrap();
        assert_eq!(reopened.get_job(7).unwrap().unwrap().context_id, 70);
    }
}
