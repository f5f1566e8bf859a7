//! Configuration for file store backends

use crate::files::{mock_store::MockFileStore, sqlite_store::SqliteFileStore, FileStorage, FileStoreError};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Available file store backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum FileBackend {
    #[default]
    Sqlite,
    Mock,
}

impl std::str::FromStr for FileBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "local" => Ok(FileBackend::Sqlite),
            "mock" | "memory" => Ok(FileBackend::Mock),
            _ => Err(format!("Unknown file backend: {}", s)),
        }
    }
}

/// File store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesConfig {
    /// File store backend type
    #[serde(default)]
    pub backend: FileBackend,
    /// Database holding the file records
    pub db_path: PathBuf,
    /// Directory holding file content
    pub content_path: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            backend: FileBackend::default(),
            db_path: PathBuf::from("./data/archive.sqlite"),
            content_path: PathBuf::from("./data/files"),
        }
    }
}

impl FilesConfig {
    /// Create a file store instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn FileStorage>, FileStoreError> {
        match self.backend {
            FileBackend::Sqlite => {
                info!(
                    "Creating SQLite file store with db_path: {}, content_path: {}",
                    self.db_path.display(),
                    self.content_path.display()
                );
                Ok(Arc::new(SqliteFileStore::open(&self.db_path, &self.content_path)?))
            }
            FileBackend::Mock => {
                info!("Creating mock file store");
                Ok(Arc::new(MockFileStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_from_str() {
        assert_eq!("sqlite".parse::<FileBackend>().unwrap(), FileBackend::Sqlite);
        assert_eq!("Local".parse::<FileBackend>().unwrap(), FileBackend::Sqlite);
        assert_eq!("mock".parse::<FileBackend>().unwrap(), FileBackend::Mock);
        assert_eq!("MOCK".parse::<FileBackend>().unwrap(), FileBackend::Mock);

        assert!("s3".parse::<FileBackend>().is_err());
    }

    #[test]
    fn test_files_config_default() {
        let config = FilesConfig::default();
        assert_eq!(config.backend, FileBackend::Sqlite);
        assert_eq!(config.content_path, PathBuf::from("./data/files"));
    }

    #[test]
    fn test_create_store() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = FilesConfig {
            backend: FileBackend::Sqlite,
            db_path: dir.path().join("files.sqlite"),
            content_path: dir.path().join("content"),
        };
        let store = sqlite.create_store().unwrap();
        assert!(store.get_file(1).unwrap().is_none());
        assert!(dir.path().join("content").is_dir());

        let mock = FilesConfig { backend: FileBackend::Mock, ..FilesConfig::default() };
        let store = mock.create_store().unwrap();
        assert!(store.free_bytes().is_none());
    }
}
