//! File Management Layer
//!
//! The archive drivers sit on top of a general purpose file store: records
//! addressed by a placement (context, component, filearea, item, path, name)
//! with their content kept by the backend. This module provides the
//! abstraction plus SQLite and in-memory implementations.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a file record inside the file store
pub type FileId = i64;

/// Where a file lives inside the file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePlacement {
    pub context_id: i64,
    pub component: String,
    pub filearea: String,
    pub item_id: i64,
    /// Directory path, always starting and ending with `/`
    pub filepath: String,
    pub filename: String,
    pub mimetype: String,
    pub created_at: DateTime<Utc>,
}

impl FilePlacement {
    /// Check that the placement cannot escape the store's content root
    pub fn validate(&self) -> Result<(), FileStoreError> {
        if self.filename.is_empty()
            || self.filename == "."
            || self.filename == ".."
            || self.filename.contains(&['/', '\\', '\0'][..])
        {
            return Err(FileStoreError::InvalidPlacement(format!(
                "invalid filename: {:?}",
                self.filename
            )));
        }
        if !self.filepath.starts_with('/') || !self.filepath.ends_with('/') {
            return Err(FileStoreError::InvalidPlacement(format!(
                "filepath must start and end with '/': {:?}",
                self.filepath
            )));
        }
        if self
            .path_segments()
            .any(|segment| segment == "." || segment == ".." || segment.contains(&['\\', '\0'][..]))
        {
            return Err(FileStoreError::InvalidPlacement(format!(
                "invalid filepath: {:?}",
                self.filepath
            )));
        }
        for name in [&self.component, &self.filearea] {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(FileStoreError::InvalidPlacement(format!(
                    "invalid component or filearea: {:?}",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Non-empty segments of the filepath
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.filepath.split('/').filter(|segment| !segment.is_empty())
    }
}

/// A stored file as reported by the file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub context_id: i64,
    pub component: String,
    pub filearea: String,
    pub item_id: i64,
    pub filepath: String,
    pub filename: String,
    pub mimetype: String,
    /// Size of the content as written
    pub filesize: u64,
    /// MD5 of the content, checked on every read
    pub contenthash: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Errors raised by file store backends
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file already exists: {0}")]
    Conflict(String),

    #[error("invalid file placement: {0}")]
    InvalidPlacement(String),

    #[error("content of file {0} does not match its recorded hash")]
    Corrupted(FileId),

    #[error("content of file {0} is missing")]
    ContentMissing(FileId),

    #[error("file store is out of space: {needed} bytes needed, {free} free")]
    OutOfSpace { needed: u64, free: u64 },

    #[error("file store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("file store lock poisoned")]
    Poisoned,

    #[error("file store failure: {0}")]
    Other(String),
}

/// Trait defining the file store interface the local driver builds on
pub trait FileStorage: Send + Sync {
    /// Create a new file from raw content. Fails with `Conflict` if a file
    /// already exists at the same placement.
    fn create_file(&self, placement: &FilePlacement, content: &[u8]) -> Result<FileRecord, FileStoreError>;

    /// Look up a file record by id
    fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, FileStoreError>;

    /// Read the content of a file, verifying it against the recorded hash
    fn read_content(&self, record: &FileRecord) -> Result<Vec<u8>, FileStoreError>;

    /// Delete a file. Returns `true` if the file existed.
    fn delete_file(&self, id: FileId) -> Result<bool, FileStoreError>;

    /// Free capacity of the backing storage, `None` if it cannot be determined
    fn free_bytes(&self) -> Option<u64>;
}
