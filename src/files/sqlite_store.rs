//! SQLite implementation of FileStorage
//!
//! File records live in a SQLite table, the content lives on disk below the
//! content root, one file per record id.

use crate::files::{FileId, FilePlacement, FileRecord, FileStorage, FileStoreError};
use crate::hashing::{hash_content, HashAlgorithm};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

const SELECT_COLUMNS: &str = "id, context_id, component, filearea, item_id, filepath, filename,
    mimetype, filesize, contenthash, timecreated, timemodified";

/// SQLite implementation of FileStorage
pub struct SqliteFileStore {
    conn: Mutex<Connection>,
    content_root: PathBuf,
}

impl SqliteFileStore {
    /// Open (or create) a file store with records in `db_path` and content below `content_root`
    pub fn open(db_path: &Path, content_root: &Path) -> Result<Self, FileStoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn, content_root)
    }

    /// File store with an in-memory record table, content still goes to disk
    pub fn open_in_memory(content_root: &Path) -> Result<Self, FileStoreError> {
        Self::init(Connection::open_in_memory()?, content_root)
    }

    fn init(conn: Connection, content_root: &Path) -> Result<Self, FileStoreError> {
        fs::create_dir_all(content_root)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL,
                component TEXT NOT NULL,
                filearea TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                filepath TEXT NOT NULL,
                filename TEXT NOT NULL,
                mimetype TEXT NOT NULL,
                filesize INTEGER NOT NULL,
                contenthash TEXT NOT NULL,
                timecreated INTEGER NOT NULL,
                timemodified INTEGER NOT NULL,
                UNIQUE(context_id, component, filearea, item_id, filepath, filename)
            )",
            [],
        )?;
        info!("Using file content root: {}", content_root.display());
        Ok(Self {
            conn: Mutex::new(conn),
            content_root: content_root.to_path_buf(),
        })
    }

    /// Number of file records, mainly for tests
    pub fn file_count(&self) -> Result<usize, FileStoreError> {
        let conn = self.conn.lock().map_err(|_| FileStoreError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Location of the content of file `id`
    ///
    /// Content is keyed by record id, never by placement, so any two
    /// placements the unique index accepts can coexist on disk.
    fn content_path(&self, id: FileId) -> PathBuf {
        self.content_root
            .join(format!("{:02x}", id & 0xff))
            .join(id.to_string())
    }

    fn record_path(&self, record: &FileRecord) -> PathBuf {
        self.content_path(record.id)
    }

    fn find_id(&self, conn: &Connection, placement: &FilePlacement) -> Result<Option<FileId>, FileStoreError> {
        let id = conn
            .query_row(
                "SELECT id FROM files WHERE context_id = ?1 AND component = ?2 AND filearea = ?3
                 AND item_id = ?4 AND filepath = ?5 AND filename = ?6",
                params![
                    placement.context_id,
                    placement.component,
                    placement.filearea,
                    placement.item_id,
                    placement.filepath,
                    placement.filename
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Write content to `target` through a synced temp file
    ///
    /// Record ids are never reused, so a file already at `target` is an orphan.
    fn write_content(target: &Path, content: &[u8]) -> Result<(), FileStoreError> {
        let dir = target
            .parent()
            .ok_or_else(|| FileStoreError::InvalidPlacement(target.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(target) {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                // Content without a record is left over from an interrupted create
                warn!("Replacing orphaned content at {}", target.display());
                e.file.persist(target).map_err(|e| FileStoreError::Io(e.error))?;
                Ok(())
            }
            Err(e) => Err(FileStoreError::Io(e.error)),
        }
    }
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let filesize: i64 = row.get(8)?;
    Ok(FileRecord {
        id: row.get(0)?,
        context_id: row.get(1)?,
        component: row.get(2)?,
        filearea: row.get(3)?,
        item_id: row.get(4)?,
        filepath: row.get(5)?,
        filename: row.get(6)?,
        mimetype: row.get(7)?,
        filesize: filesize as u64,
        contenthash: row.get(9)?,
        created_at: timestamp(row.get(10)?),
        modified_at: timestamp(row.get(11)?),
    })
}

impl FileStorage for SqliteFileStore {
    fn create_file(&self, placement: &FilePlacement, content: &[u8]) -> Result<FileRecord, FileStoreError> {
        placement.validate()?;

        // Held until the content is in place, creates never interleave
        let conn = self.conn.lock().map_err(|_| FileStoreError::Poisoned)?;
        if self.find_id(&conn, placement)?.is_some() {
            return Err(FileStoreError::Conflict(format!("{}{}", placement.filepath, placement.filename)));
        }

        let contenthash = hash_content(content, HashAlgorithm::Md5);
        let modified_at = Utc::now();
        let id = conn
            .execute(
                "INSERT INTO files (context_id, component, filearea, item_id, filepath, filename,
                    mimetype, filesize, contenthash, timecreated, timemodified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    placement.context_id,
                    placement.component,
                    placement.filearea,
                    placement.item_id,
                    placement.filepath,
                    placement.filename,
                    placement.mimetype,
                    content.len() as i64,
                    contenthash,
                    placement.created_at.timestamp_millis(),
                    modified_at.timestamp_millis()
                ],
            )
            .map(|_| conn.last_insert_rowid())
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                    FileStoreError::Conflict(format!("{}{}", placement.filepath, placement.filename))
                }
                other => FileStoreError::Database(other),
            })?;

        let target = self.content_path(id);
        if let Err(e) = Self::write_content(&target, content) {
            if let Err(cleanup) = conn.execute("DELETE FROM files WHERE id = ?1", params![id]) {
                warn!("Failed to remove record {} after write error: {}", id, cleanup);
            }
            return Err(e);
        }

        debug!("Created file {} at {}", id, target.display());
        Ok(FileRecord {
            id,
            context_id: placement.context_id,
            component: placement.component.clone(),
            filearea: placement.filearea.clone(),
            item_id: placement.item_id,
            filepath: placement.filepath.clone(),
            filename: placement.filename.clone(),
            mimetype: placement.mimetype.clone(),
            filesize: content.len() as u64,
            contenthash,
            created_at: timestamp(placement.created_at.timestamp_millis()),
            modified_at: timestamp(modified_at.timestamp_millis()),
        })
    }

    fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, FileStoreError> {
        let conn = self.conn.lock().map_err(|_| FileStoreError::Poisoned)?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn read_content(&self, record: &FileRecord) -> Result<Vec<u8>, FileStoreError> {
        let path = self.record_path(record);
        let content = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileStoreError::ContentMissing(record.id),
            _ => FileStoreError::Io(e),
        })?;

        if hash_content(&content, HashAlgorithm::Md5) != record.contenthash {
            return Err(FileStoreError::Corrupted(record.id));
        }
        Ok(content)
    }

    fn delete_file(&self, id: FileId) -> Result<bool, FileStoreError> {
        let conn = self.conn.lock().map_err(|_| FileStoreError::Poisoned)?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()?;

        let Some(record) = record else {
            return Ok(false);
        };

        let path = self.record_path(&record);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Content of file {} was already gone: {}", id, path.display());
            }
            Err(e) => return Err(FileStoreError::Io(e)),
        }

        conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        debug!("Deleted file {} at {}", id, path.display());
        Ok(true)
    }

    fn free_bytes(&self) -> Option<u64> {
        match fs2::available_space(&self.content_root) {
            Ok(free) => Some(free),
            Err(e) => {
                warn!("Could not determine free space of {}: {}", self.content_root.display(), e);
                None
            }
        }
    }
}
