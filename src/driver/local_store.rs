//! Driver storing archive artifacts in the local file store
//!
//! A thin adapter: placement is scoped by the job's context and the actual
//! bytes are handled by whatever [`FileStorage`] backend is configured.

use crate::driver::handle::HandleFields;
use crate::driver::{
    normalize_path, verify_integrity, ArchivingStore, DriverSettings, FileHandle, RetrievalDescriptor,
    RetrievedFile, SourceFile, StorageError, StorageResult, StorageTier,
};
use crate::files::{FileId, FilePlacement, FileRecord, FileStorage, FileStoreError};
use crate::hashing::sha256_hex;
use crate::jobs::{ArchiveJob, JobDirectory, JobId};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Name recorded in handles issued by this driver
pub const DRIVER_NAME: &str = "local";

/// Component passed to the file store
pub const FS_COMPONENT: &str = "archivingstore_local";

/// File area artifacts are stored in
pub const FS_FILEAREA_ARTIFACTS: &str = "artifacts";

/// Local file store driver
pub struct LocalArchivingStore {
    files: Arc<dyn FileStorage>,
    jobs: Arc<dyn JobDirectory>,
    settings: DriverSettings,
}

impl LocalArchivingStore {
    pub fn new(files: Arc<dyn FileStorage>, jobs: Arc<dyn JobDirectory>, settings: DriverSettings) -> Self {
        Self { files, jobs, settings }
    }

    fn placement(job: &ArchiveJob, file: &SourceFile, filepath: &str) -> FilePlacement {
        let mut dir = format!("/{}/{}/", job.context_id, job.id);
        if !filepath.is_empty() {
            dir.push_str(filepath);
            dir.push('/');
        }

        FilePlacement {
            context_id: job.context_id,
            component: FS_COMPONENT.to_string(),
            filearea: FS_FILEAREA_ARTIFACTS.to_string(),
            item_id: job.id,
            filepath: dir,
            filename: file.filename.clone(),
            mimetype: file.mimetype.clone(),
            created_at: file.created_at,
        }
    }

    fn file_id(handle: &FileHandle) -> StorageResult<FileId> {
        handle
            .driver_key()
            .parse::<FileId>()
            .map_err(|_| StorageError::InvalidHandle(format!("malformed file key {:?}", handle.driver_key())))
    }

    /// Record behind a handle, if the file store still has it
    fn lookup(&self, handle: &FileHandle) -> StorageResult<Option<FileRecord>> {
        let id = Self::file_id(handle)?;
        let record = self.files.get_file(id).map_err(failure)?;

        // A key pointing at someone else's file is as good as a missing file
        Ok(record.filter(|record| {
            record.component == FS_COMPONENT
                && record.filearea == FS_FILEAREA_ARTIFACTS
                && record.item_id == handle.job_id()
                && record.filename == handle.filename()
        }))
    }

    /// Best-effort removal of a file whose store did not complete
    fn discard(&self, id: FileId) {
        if let Err(e) = self.files.delete_file(id) {
            error!("Failed to remove incomplete file {}: {}", id, e);
        }
    }
}

fn failure(e: FileStoreError) -> StorageError {
    StorageError::StorageFailure(e.to_string())
}

impl ArchivingStore for LocalArchivingStore {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn display_name(&self) -> &'static str {
        "Local file storage"
    }

    fn storage_tier(&self) -> StorageTier {
        StorageTier::Local
    }

    fn supports_retrieve(&self) -> bool {
        true
    }

    fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn free_bytes(&self) -> Option<u64> {
        self.files.free_bytes()
    }

    fn store(&self, job_id: JobId, file: &SourceFile, path: &str) -> StorageResult<FileHandle> {
        let job = self
            .jobs
            .get_job(job_id)
            .map_err(|e| StorageError::StorageFailure(format!("job lookup failed: {}", e)))?
            .ok_or_else(|| StorageError::StorageFailure(format!("unknown archive job {}", job_id)))?;

        let filepath = normalize_path(path);
        let placement = Self::placement(&job, file, &filepath);
        debug!(
            "Storing {} for job {} at {}{}",
            file.filename, job_id, placement.filepath, placement.filename
        );

        let record = self.files.create_file(&placement, &file.content).map_err(|e| {
            error!("Failed to store {} for job {}: {}", file.filename, job_id, e);
            failure(e)
        })?;

        // Build the handle from what the file store actually holds
        let stored = match self.files.read_content(&record) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to read back file {} for job {}: {}", record.id, job_id, e);
                self.discard(record.id);
                return Err(failure(e));
            }
        };
        let sha256sum = sha256_hex(&stored);
        if sha256sum != sha256_hex(&file.content) {
            error!("Stored content of file {} differs from the input", record.id);
            self.discard(record.id);
            return Err(StorageError::StorageFailure(format!(
                "content verification failed for {}",
                file.filename
            )));
        }

        let handle = FileHandle::issue(HandleFields {
            job_id,
            driver_name: DRIVER_NAME.to_string(),
            filename: record.filename.clone(),
            filepath,
            filesize: stored.len() as u64,
            sha256sum,
            mimetype: record.mimetype.clone(),
            driver_key: record.id.to_string(),
        });
        if handle.is_err() {
            self.discard(record.id);
        }
        let handle = handle?;

        info!(
            "Stored {} ({} bytes) for job {} as file {}",
            handle.filename(),
            handle.filesize(),
            job_id,
            record.id
        );
        Ok(handle)
    }

    fn retrieve(&self, handle: &FileHandle, target: &RetrievalDescriptor) -> StorageResult<RetrievedFile> {
        self.check_handle(handle)?;

        let record = self.lookup(handle)?.ok_or_else(|| {
            StorageError::NotFound(format!("file {} of job {}", handle.driver_key(), handle.job_id()))
        })?;

        let content = self.files.read_content(&record).map_err(|e| match e {
            FileStoreError::ContentMissing(id) => StorageError::NotFound(format!("content of file {}", id)),
            other => {
                error!("Failed to read file {}: {}", record.id, other);
                failure(other)
            }
        })?;
        verify_integrity(handle, &content)?;

        info!(
            "Retrieved file {} of job {} as {}{}",
            record.id,
            handle.job_id(),
            target.filepath,
            target.filename
        );
        Ok(RetrievedFile {
            filename: target.filename.clone(),
            filepath: target.filepath.clone(),
            mimetype: target.mimetype.clone(),
            content: Bytes::from(content),
        })
    }

    fn delete(&self, handle: &FileHandle, strict: bool) -> StorageResult<()> {
        self.check_handle(handle)?;

        let deleted = match self.lookup(handle)? {
            Some(record) => self.files.delete_file(record.id).map_err(failure)?,
            None => false,
        };

        if deleted {
            info!("Deleted file {} of job {}", handle.driver_key(), handle.job_id());
            return Ok(());
        }

        if strict {
            return Err(StorageError::NotFound(format!(
                "file {} of job {}",
                handle.driver_key(),
                handle.job_id()
            )));
        }
        // Cleanup paths may delete twice; an absent file counts as deleted
        warn!(
            "File {} of job {} already absent, nothing to delete",
            handle.driver_key(),
            handle.job_id()
        );
        Ok(())
    }
}
