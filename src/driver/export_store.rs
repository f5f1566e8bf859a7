//! Write-only driver exporting artifacts to a plain directory tree
//!
//! Files land at `<export_path>/<job_id>/<logical path>/<filename>`, ready to
//! be picked up by whatever moves them to cold storage. The driver key is the
//! path relative to the export root.
//!
//! The tree mirrors logical paths one to one, so a job cannot hold a file and
//! a directory of the same name: storing `report` next to `report/part.txt`
//! fails with a `StorageFailure` and leaves the existing entry untouched.

use crate::driver::handle::HandleFields;
use crate::driver::{
    normalize_path, ArchivingStore, DriverSettings, FileHandle, SourceFile, StorageError, StorageResult,
    StorageTier,
};
use crate::hashing::sha256_hex;
use crate::jobs::JobId;
use log::{debug, error, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Name recorded in handles issued by this driver
pub const DRIVER_NAME: &str = "export";

/// Export directory driver
pub struct ExportArchivingStore {
    export_path: PathBuf,
    settings: DriverSettings,
    // Orders directory creation and placement against pruning on delete
    dir_lock: Mutex<()>,
}

fn invalid_segment(segment: &str) -> bool {
    segment.is_empty() || segment == "." || segment == ".." || segment.contains(&['\\', '\0'][..])
}

impl ExportArchivingStore {
    /// Open the export directory, creating it if needed
    pub fn open(export_path: impl Into<PathBuf>, settings: DriverSettings) -> StorageResult<Self> {
        let export_path = export_path.into();
        fs::create_dir_all(&export_path).map_err(|e| {
            StorageError::StorageFailure(format!(
                "cannot create export directory {}: {}",
                export_path.display(),
                e
            ))
        })?;
        info!("Using export directory: {}", export_path.display());

        Ok(Self {
            export_path,
            settings,
            dir_lock: Mutex::new(()),
        })
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Relative key for a file of `job_id`
    fn make_key(job_id: JobId, filepath: &str, filename: &str) -> StorageResult<String> {
        if invalid_segment(filename) || filename.contains('/') {
            return Err(StorageError::StorageFailure(format!("invalid filename: {:?}", filename)));
        }
        if !filepath.is_empty() && filepath.split('/').any(invalid_segment) {
            return Err(StorageError::StorageFailure(format!("invalid path: {:?}", filepath)));
        }

        Ok(if filepath.is_empty() {
            format!("{}/{}", job_id, filename)
        } else {
            format!("{}/{}/{}", job_id, filepath, filename)
        })
    }

    /// Absolute location of a handle's file, rejecting keys that leave the job directory
    fn resolve(&self, handle: &FileHandle) -> StorageResult<PathBuf> {
        let key = handle.driver_key();
        if key.starts_with('/') || key.split('/').any(invalid_segment) {
            return Err(StorageError::InvalidHandle(format!("unsafe export key {:?}", key)));
        }
        let job_dir = handle.job_id().to_string();
        if key.split('/').next() != Some(job_dir.as_str()) || !key.contains('/') {
            return Err(StorageError::InvalidHandle(format!(
                "export key {:?} does not belong to job {}",
                key,
                handle.job_id()
            )));
        }

        Ok(key.split('/').fold(self.export_path.clone(), |path, segment| path.join(segment)))
    }

    fn lock_dirs(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.dir_lock
            .lock()
            .map_err(|_| StorageError::StorageFailure("export directory lock poisoned".to_string()))
    }

    /// Entry in the way of placing a file at `dest`: a directory at `dest`
    /// itself, or a file where one of its parent directories should be
    fn layout_clash(&self, dest: &Path) -> Option<PathBuf> {
        if dest.is_dir() {
            return Some(dest.to_path_buf());
        }
        dest.ancestors()
            .skip(1)
            .take_while(|dir| *dir != self.export_path)
            .find(|dir| dir.is_file())
            .map(Path::to_path_buf)
    }

    /// Synced temp file in the export root, renamed into place later
    fn stage(&self, content: &[u8]) -> io::Result<NamedTempFile> {
        let mut temp = NamedTempFile::new_in(&self.export_path)?;
        temp.write_all(content)?;
        temp.as_file().sync_all()?;
        Ok(temp)
    }

    /// Remove directories left empty below the export root
    fn prune_empty_dirs(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(current) = dir {
            if current == self.export_path || !current.starts_with(&self.export_path) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

impl ArchivingStore for ExportArchivingStore {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn display_name(&self) -> &'static str {
        "Export directory"
    }

    fn storage_tier(&self) -> StorageTier {
        StorageTier::Cold
    }

    fn supports_retrieve(&self) -> bool {
        false
    }

    fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn free_bytes(&self) -> Option<u64> {
        match fs2::available_space(&self.export_path) {
            Ok(free) => Some(free),
            Err(e) => {
                warn!("Cannot query free space of {}: {}", self.export_path.display(), e);
                None
            }
        }
    }

    fn store(&self, job_id: JobId, file: &SourceFile, path: &str) -> StorageResult<FileHandle> {
        let filepath = normalize_path(path);
        let key = Self::make_key(job_id, &filepath, &file.filename)?;
        let dest = key.split('/').fold(self.export_path.clone(), |path, segment| path.join(segment));
        let dir = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.export_path.clone());
        debug!("Exporting {} for job {} to {}", file.filename, job_id, dest.display());

        let staged = self.stage(&file.content).map_err(|e| {
            error!("Failed to stage {}: {}", dest.display(), e);
            StorageError::StorageFailure(e.to_string())
        })?;

        {
            let _dirs = self.lock_dirs()?;
            if let Some(clash) = self.layout_clash(&dest) {
                error!("Cannot export {}: {} is in the way", dest.display(), clash.display());
                return Err(StorageError::StorageFailure(format!(
                    "{} conflicts with an existing file or directory",
                    key
                )));
            }
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create {}: {}", dir.display(), e);
                StorageError::StorageFailure(e.to_string())
            })?;
            if let Err(e) = staged.persist_noclobber(&dest) {
                error!("Failed to export {}: {}", dest.display(), e.error);
                return Err(StorageError::StorageFailure(if e.error.kind() == io::ErrorKind::AlreadyExists {
                    format!("{} already exists", key)
                } else {
                    e.error.to_string()
                }));
            }
        }

        // Build the handle from what actually landed on disk
        let stored = match fs::read(&dest) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to read back {}: {}", dest.display(), e);
                let _ = fs::remove_file(&dest);
                return Err(StorageError::StorageFailure(e.to_string()));
            }
        };
        let sha256sum = sha256_hex(&stored);
        if sha256sum != sha256_hex(&file.content) {
            error!("Exported content of {} differs from the input", dest.display());
            let _ = fs::remove_file(&dest);
            return Err(StorageError::StorageFailure(format!(
                "content verification failed for {}",
                file.filename
            )));
        }

        let handle = FileHandle::issue(HandleFields {
            job_id,
            driver_name: DRIVER_NAME.to_string(),
            filename: file.filename.clone(),
            filepath,
            filesize: stored.len() as u64,
            sha256sum,
            mimetype: file.mimetype.clone(),
            driver_key: key,
        });
        if handle.is_err() {
            let _ = fs::remove_file(&dest);
        }
        let handle = handle?;

        info!(
            "Exported {} ({} bytes) for job {} to {}",
            handle.filename(),
            handle.filesize(),
            job_id,
            dest.display()
        );
        Ok(handle)
    }

    fn delete(&self, handle: &FileHandle, strict: bool) -> StorageResult<()> {
        self.check_handle(handle)?;
        let path = self.resolve(handle)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted exported file {}", path.display());
                let _dirs = self.lock_dirs()?;
                self.prune_empty_dirs(&path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if strict {
                    return Err(StorageError::NotFound(handle.driver_key().to_string()));
                }
                warn!("Exported file {} already absent, nothing to delete", path.display());
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete {}: {}", path.display(), e);
                Err(StorageError::StorageFailure(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn export_driver() -> (ExportArchivingStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let driver = ExportArchivingStore::open(dir.path().join("export"), DriverSettings::default()).unwrap();
        (driver, dir)
    }

    fn hello() -> SourceFile {
        SourceFile::new("hello.txt", Bytes::from_static(b"helloworld")).with_mimetype("text/plain")
    }

    fn with_key(handle: &FileHandle, key: &str) -> FileHandle {
        let mut value: serde_json::Value = serde_json::from_str(&handle.to_json().unwrap()).unwrap();
        value["driver_key"] = key.into();
        FileHandle::from_json(&value.to_string()).unwrap()
    }

    #[test]
    fn test_descriptors() {
        let (driver, _dir) = export_driver();
        assert_eq!(driver.name(), "export");
        assert_eq!(driver.storage_tier(), StorageTier::Cold);
        assert!(!driver.supports_retrieve());
        assert!(driver.export_path().is_dir());
    }

    #[test]
    fn test_store_writes_file_under_job_directory() {
        let (driver, _dir) = export_driver();
        let handle = driver.store(42, &hello(), "/foo/bar/").unwrap();

        assert_eq!(handle.driver_name(), DRIVER_NAME);
        assert_eq!(handle.driver_key(), "42/foo/bar/hello.txt");
        assert_eq!(handle.filepath(), "foo/bar");
        assert_eq!(handle.filesize(), 10);
        assert_eq!(handle.sha256sum(), sha256_hex(b"helloworld"));

        let written = driver.export_path().join("42").join("foo").join("bar").join("hello.txt");
        assert_eq!(fs::read(&written).unwrap(), b"helloworld");

        // Only the final file remains in the directory
        let entries: Vec<_> = fs::read_dir(written.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_store_does_not_overwrite() {
        let (driver, _dir) = export_driver();
        driver.store(42, &hello(), "/").unwrap();

        let other = SourceFile::new("hello.txt", Bytes::from_static(b"different"));
        assert!(matches!(driver.store(42, &other, "/"), Err(StorageError::StorageFailure(_))));
        assert_eq!(fs::read(driver.export_path().join("42").join("hello.txt")).unwrap(), b"helloworld");
    }

    #[test]
    fn test_file_and_directory_with_same_name_conflict() {
        let (driver, _dir) = export_driver();
        let report = SourceFile::new("report", Bytes::from_static(b"summary"));
        let part = SourceFile::new("part.txt", Bytes::from_static(b"part one"));

        // File first, then a directory of the same name
        driver.store(42, &report, "/").unwrap();
        let err = driver.store(42, &part, "/report").unwrap_err();
        assert!(matches!(&err, StorageError::StorageFailure(msg) if msg.contains("conflicts")));
        assert_eq!(fs::read(driver.export_path().join("42").join("report")).unwrap(), b"summary");

        // Directory first, then a file of the same name
        driver.store(43, &part, "/report").unwrap();
        let err = driver.store(43, &report, "/").unwrap_err();
        assert!(matches!(&err, StorageError::StorageFailure(msg) if msg.contains("conflicts")));
        assert_eq!(
            fs::read(driver.export_path().join("43").join("report").join("part.txt")).unwrap(),
            b"part one"
        );

        // Rejected stores leave no staged files behind
        let leftovers: Vec<_> = fs::read_dir(driver.export_path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2);
    }

    #[test]
    fn test_concurrent_store_and_delete_in_one_directory() {
        let (driver, _dir) = export_driver();
        let driver = std::sync::Arc::new(driver);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let driver = driver.clone();
                std::thread::spawn(move || {
                    for round in 0..25 {
                        let file = SourceFile::new(format!("part-{}-{}.bin", worker, round), vec![worker as u8; 64]);
                        let handle = driver.store(42, &file, "/shared/out").unwrap();
                        driver.delete(&handle, true).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(!driver.export_path().join("42").exists());
    }

    #[test]
    fn test_store_rejects_traversal() {
        let (driver, _dir) = export_driver();
        assert!(matches!(driver.store(42, &hello(), "/foo/../../x"), Err(StorageError::StorageFailure(_))));
        let file = SourceFile::new("..", Bytes::from_static(b"x"));
        assert!(matches!(driver.store(42, &file, "/"), Err(StorageError::StorageFailure(_))));
    }

    #[test]
    fn test_retrieve_not_implemented() {
        let (driver, _dir) = export_driver();
        let handle = driver.store(42, &hello(), "/").unwrap();
        let err = driver.retrieve(&handle, &handle.generate_retrieval_descriptor()).unwrap_err();
        assert_eq!(
            err,
            StorageError::NotImplemented {
                driver: "export",
                operation: "retrieve"
            }
        );
    }

    #[test]
    fn test_delete_strict_and_non_strict() {
        let (driver, _dir) = export_driver();
        let handle = driver.store(42, &hello(), "/foo").unwrap();

        driver.delete(&handle, true).unwrap();
        assert!(!driver.export_path().join("42").exists());

        driver.delete(&handle, false).unwrap();
        assert!(matches!(driver.delete(&handle, true), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete_rejects_unsafe_keys() {
        let (driver, _dir) = export_driver();
        let handle = driver.store(42, &hello(), "/").unwrap();

        for key in ["../outside.txt", "/etc/passwd", "42/../43/hello.txt", "43/hello.txt", "42", "42//x"] {
            let forged = with_key(&handle, key);
            assert!(
                matches!(driver.delete(&forged, false), Err(StorageError::InvalidHandle(_))),
                "key {:?} should be rejected",
                key
            );
        }
        assert!(driver.export_path().join("42").join("hello.txt").exists());
    }

    #[test]
    fn test_availability() {
        let (driver, _dir) = export_driver();
        assert!(driver.free_bytes().is_some());

        let dir = tempfile::tempdir().unwrap();
        let disabled = ExportArchivingStore::open(dir.path(), DriverSettings::disabled()).unwrap();
        assert!(!disabled.is_available());

        let greedy = ExportArchivingStore::open(dir.path(), DriverSettings::default().with_safety_margin(u64::MAX)).unwrap();
        assert!(!greedy.is_available());

        let modest = ExportArchivingStore::open(dir.path(), DriverSettings::default().with_safety_margin(0)).unwrap();
        assert_eq!(modest.is_available(), modest.free_bytes().unwrap_or(1) > 0);
    }
}
