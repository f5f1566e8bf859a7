//! Archiving Store Drivers
//!
//! This module provides the driver abstraction archive jobs use to persist
//! their artifacts. Every backend (local file store, export directory, future
//! network stores) implements [`ArchivingStore`]; callers only ever hold the
//! [`FileHandle`] a driver returned and hand it back to the same driver for
//! retrieval or deletion.

pub mod config;
pub mod error;
pub mod export_store;
pub mod handle;
pub mod local_store;
pub mod registry;
pub mod tier;


use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;
use crate::jobs::JobId;

pub use error::{StorageError, StorageResult};
pub use handle::{FileHandle, RetrievalDescriptor};
pub use registry::DriverRegistry;
pub use tier::StorageTier;

/// Free space a driver keeps in reserve before reporting itself unavailable (1 GiB)
pub const DEFAULT_SAFETY_MARGIN: u64 = 1024 * 1024 * 1024;

/// Mimetype used when the caller does not declare one
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

fn default_enabled() -> bool {
    true
}

fn default_safety_margin() -> u64 {
    DEFAULT_SAFETY_MARGIN
}

/// Per driver instance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Whether the driver may be used at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free bytes that must remain after admission
    #[serde(default = "default_safety_margin")]
    pub safety_margin_bytes: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            safety_margin_bytes: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl DriverSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_safety_margin(mut self, bytes: u64) -> Self {
        self.safety_margin_bytes = bytes;
        self
    }
}

/// A file handed to a driver for archiving
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub mimetype: String,
    pub content: Bytes,
    pub created_at: DateTime<Utc>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mimetype: DEFAULT_MIMETYPE.to_string(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }

    pub fn filesize(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Content handed back by `retrieve()`, labelled after the retrieval descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedFile {
    pub filename: String,
    pub filepath: String,
    pub mimetype: String,
    pub content: Bytes,
}

impl RetrievedFile {
    pub fn filesize(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Strip leading and trailing `/` from a logical path
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Check retrieved bytes against the size and digest recorded in the handle
pub fn verify_integrity(handle: &FileHandle, content: &[u8]) -> StorageResult<()> {
    if content.len() as u64 != handle.filesize() {
        return Err(StorageError::StorageFailure(format!(
            "size mismatch for {}: expected {} bytes, got {}",
            handle.filename(),
            handle.filesize(),
            content.len()
        )));
    }
    if sha256_hex(content) != handle.sha256sum() {
        return Err(StorageError::StorageFailure(format!(
            "checksum mismatch for {}",
            handle.filename()
        )));
    }
    Ok(())
}

/// Trait implemented by every archiving storage backend
///
/// Descriptor methods (`storage_tier`, `supports_retrieve`, `free_bytes`,
/// `is_available`) must be cheap and free of side effects.
pub trait ArchivingStore: Send + Sync {
    /// Identifier written into every handle this driver issues
    fn name(&self) -> &'static str;

    /// Human readable name, display only
    fn display_name(&self) -> &'static str;

    /// Storage class, constant per driver type
    fn storage_tier(&self) -> StorageTier;

    /// Whether stored files can be read back, constant per driver type
    fn supports_retrieve(&self) -> bool;

    /// Settings the driver was constructed with
    fn settings(&self) -> &DriverSettings;

    /// Best-effort free capacity probe. `None` means unknown, not empty.
    fn free_bytes(&self) -> Option<u64>;

    /// Whether new files may be stored right now
    ///
    /// A disabled driver is never available. With known capacity the free
    /// space must exceed the safety margin; unknown capacity does not block.
    fn is_available(&self) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            return false;
        }
        match self.free_bytes() {
            Some(free) => free > settings.safety_margin_bytes,
            None => {
                debug!("Driver {} cannot report free space, assuming available", self.name());
                true
            }
        }
    }

    /// Persist `file` for `job_id` below the logical `path`
    fn store(&self, job_id: JobId, file: &SourceFile, path: &str) -> StorageResult<FileHandle>;

    /// Read a stored file back, labelled after `target`
    fn retrieve(&self, handle: &FileHandle, target: &RetrievalDescriptor) -> StorageResult<RetrievedFile> {
        let _ = (handle, target);
        Err(StorageError::NotImplemented {
            driver: self.name(),
            operation: "retrieve",
        })
    }

    /// Remove a stored file. Missing files are ignored unless `strict` is set.
    fn delete(&self, handle: &FileHandle, strict: bool) -> StorageResult<()>;

    /// Reject handles issued by another driver
    fn check_handle(&self, handle: &FileHandle) -> StorageResult<()> {
        if handle.driver_name() != self.name() {
            return Err(StorageError::InvalidHandle(format!(
                "handle was issued by driver {:?}, not {:?}",
                handle.driver_name(),
                self.name()
            )));
        }
        Ok(())
    }
}
