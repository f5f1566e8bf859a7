//! Mock implementation of FileStorage for testing

use crate::files::{FileId, FilePlacement, FileRecord, FileStorage, FileStoreError};
use crate::hashing::{hash_content, HashAlgorithm};
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    next_id: FileId,
    files: HashMap<FileId, (FileRecord, Vec<u8>)>,
}

/// In-memory implementation of FileStorage
///
/// Capacity is optional: without it the store reports unknown free space.
/// Tests can inject write and read failures or corrupt stored content.
pub struct MockFileStore {
    state: Mutex<MockState>,
    capacity: Option<u64>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockFileStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            capacity: None,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Mock store that reports `capacity - used` as free space
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Make every following create fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following content read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Overwrite the stored content of a file without touching its record
    pub fn corrupt(&self, id: FileId, content: &[u8]) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.files.get_mut(&id) {
            Some((_, data)) => {
                *data = content.to_vec();
                true
            }
            None => false,
        }
    }

    /// Get the number of files in the store
    pub fn file_count(&self) -> usize {
        self.state.lock().map(|state| state.files.len()).unwrap_or(0)
    }

    /// Total bytes currently stored
    pub fn used_bytes(&self) -> u64 {
        self.state
            .lock()
            .map(|state| state.files.values().map(|(record, _)| record.filesize).sum())
            .unwrap_or(0)
    }

    /// Check if a file exists
    pub fn file_exists(&self, id: FileId) -> bool {
        self.state
            .lock()
            .map(|state| state.files.contains_key(&id))
            .unwrap_or(false)
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.files.clear();
        }
    }
}

impl Default for MockFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStorage for MockFileStore {
    fn create_file(&self, placement: &FilePlacement, content: &[u8]) -> Result<FileRecord, FileStoreError> {
        placement.validate()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FileStoreError::Other("injected write failure".to_string()));
        }

        let mut state = self.state.lock().map_err(|_| FileStoreError::Poisoned)?;

        if let Some(capacity) = self.capacity {
            let used: u64 = state.files.values().map(|(record, _)| record.filesize).sum();
            let free = capacity.saturating_sub(used);
            if content.len() as u64 > free {
                return Err(FileStoreError::OutOfSpace {
                    needed: content.len() as u64,
                    free,
                });
            }
        }

        let exists = state.files.values().any(|(record, _)| {
            record.context_id == placement.context_id
                && record.component == placement.component
                && record.filearea == placement.filearea
                && record.item_id == placement.item_id
                && record.filepath == placement.filepath
                && record.filename == placement.filename
        });
        if exists {
            return Err(FileStoreError::Conflict(format!(
                "{}{}",
                placement.filepath, placement.filename
            )));
        }

        state.next_id += 1;
        let record = FileRecord {
            id: state.next_id,
            context_id: placement.context_id,
            component: placement.component.clone(),
            filearea: placement.filearea.clone(),
            item_id: placement.item_id,
            filepath: placement.filepath.clone(),
            filename: placement.filename.clone(),
            mimetype: placement.mimetype.clone(),
            filesize: content.len() as u64,
            contenthash: hash_content(content, HashAlgorithm::Md5),
            created_at: placement.created_at,
            modified_at: Utc::now(),
        };
        state.files.insert(record.id, (record.clone(), content.to_vec()));

        info!("Mock: Created file {} with size {}", record.id, record.filesize);
        Ok(record)
    }

    fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, FileStoreError> {
        let state = self.state.lock().map_err(|_| FileStoreError::Poisoned)?;
        Ok(state.files.get(&id).map(|(record, _)| record.clone()))
    }

    fn read_content(&self, record: &FileRecord) -> Result<Vec<u8>, FileStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FileStoreError::Other("injected read failure".to_string()));
        }
        let state = self.state.lock().map_err(|_| FileStoreError::Poisoned)?;
        let (_, content) = state
            .files
            .get(&record.id)
            .ok_or(FileStoreError::ContentMissing(record.id))?;

        if hash_content(content, HashAlgorithm::Md5) != record.contenthash {
            return Err(FileStoreError::Corrupted(record.id));
        }
        Ok(content.clone())
    }

    fn delete_file(&self, id: FileId) -> Result<bool, FileStoreError> {
        let mut state = self.state.lock().map_err(|_| FileStoreError::Poisoned)?;
        let existed = state.files.remove(&id).is_some();
        info!("Mock: Deleted file {} (existed: {})", id, existed);
        Ok(existed)
    }

    fn free_bytes(&self) -> Option<u64> {
        self.capacity
            .map(|capacity| capacity.saturating_sub(self.used_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(item_id: i64, filename: &str) -> FilePlacement {
        FilePlacement {
            context_id: 1,
            component: "archivingstore_local".to_string(),
            filearea: "artifacts".to_string(),
            item_id,
            filepath: format!("/1/{}/", item_id),
            filename: filename.to_string(),
            mimetype: "application/octet-stream".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_mock_file_store_basic_operations() {
        let store = MockFileStore::new();
        assert_eq!(store.file_count(), 0);
        assert_eq!(store.free_bytes(), None);

        let record = store.create_file(&placement(1, "a.txt"), b"Hello, Mock Storage!").unwrap();
        assert_eq!(store.file_count(), 1);
        assert!(store.file_exists(record.id));
        assert_eq!(store.read_content(&record).unwrap(), b"Hello, Mock Storage!");

        assert!(store.delete_file(record.id).unwrap());
        assert!(!store.delete_file(record.id).unwrap());
        assert!(store.get_file(record.id).unwrap().is_none());
    }

    #[test]
    fn test_mock_file_store_capacity() {
        let store = MockFileStore::with_capacity(10);
        assert_eq!(store.free_bytes(), Some(10));

        store.create_file(&placement(1, "six"), b"123456").unwrap();
        assert_eq!(store.free_bytes(), Some(4));
        assert_eq!(store.used_bytes(), 6);

        let err = store.create_file(&placement(2, "five"), b"12345").unwrap_err();
        assert!(matches!(err, FileStoreError::OutOfSpace { needed: 5, free: 4 }));
    }

    #[test]
    fn test_mock_file_store_failure_injection() {
        let store = MockFileStore::new();
        store.fail_writes(true);
        assert!(store.create_file(&placement(1, "x"), b"x").is_err());
        store.fail_writes(false);

        let record = store.create_file(&placement(1, "x"), b"x").unwrap();
        assert!(matches!(store.create_file(&placement(1, "x"), b"y"), Err(FileStoreError::Conflict(_))));

        store.fail_reads(true);
        assert!(store.read_content(&record).is_err());
        store.fail_reads(false);

        assert!(store.corrupt(record.id, b"z"));
        assert!(matches!(store.read_content(&record), Err(FileStoreError::Corrupted(_))));

        store.clear();
        assert_eq!(store.file_count(), 0);
    }
}
