//! File handles issued by archiving store drivers

use crate::driver::error::{StorageError, StorageResult};
use crate::driver::normalize_path;
use crate::hashing::is_sha256_hex;
use crate::jobs::JobId;
use serde::{Deserialize, Serialize};

/// File area retrieval descriptors point at by default
pub const RETRIEVAL_FILEAREA: &str = "retrieved";

/// Immutable reference to a file stored by a driver
///
/// Handles are only produced by a successful `store()` and are meant to be
/// persisted with the job (see [`FileHandle::to_json`]). `driver_key` is
/// private to the driver named in `driver_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HandleFields")]
pub struct FileHandle {
    job_id: JobId,
    driver_name: String,
    filename: String,
    filepath: String,
    filesize: u64,
    sha256sum: String,
    mimetype: String,
    driver_key: String,
}

/// Raw handle fields, checked before they become a [`FileHandle`]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HandleFields {
    pub job_id: JobId,
    pub driver_name: String,
    pub filename: String,
    pub filepath: String,
    pub filesize: u64,
    pub sha256sum: String,
    pub mimetype: String,
    pub driver_key: String,
}

impl TryFrom<HandleFields> for FileHandle {
    type Error = String;

    fn try_from(fields: HandleFields) -> Result<Self, Self::Error> {
        if fields.driver_name.is_empty() {
            return Err("driver_name must not be empty".to_string());
        }
        if fields.filename.is_empty() || fields.filename.contains('/') {
            return Err(format!("invalid filename: {:?}", fields.filename));
        }
        if normalize_path(&fields.filepath) != fields.filepath {
            return Err(format!("filepath is not normalized: {:?}", fields.filepath));
        }
        if !is_sha256_hex(&fields.sha256sum) {
            return Err(format!("invalid sha256sum: {:?}", fields.sha256sum));
        }
        if fields.driver_key.is_empty() {
            return Err("driver_key must not be empty".to_string());
        }

        Ok(Self {
            job_id: fields.job_id,
            driver_name: fields.driver_name,
            filename: fields.filename,
            filepath: fields.filepath,
            filesize: fields.filesize,
            sha256sum: fields.sha256sum,
            mimetype: fields.mimetype,
            driver_key: fields.driver_key,
        })
    }
}

impl FileHandle {
    /// Build the handle at the end of a successful store
    pub(crate) fn issue(fields: HandleFields) -> StorageResult<Self> {
        Self::try_from(fields).map_err(StorageError::StorageFailure)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Logical path without leading or trailing `/`
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Hex encoded SHA-256 of the stored bytes
    pub fn sha256sum(&self) -> &str {
        &self.sha256sum
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    /// Backend private locator, only meaningful to the issuing driver
    pub fn driver_key(&self) -> &str {
        &self.driver_key
    }

    /// Descriptor for retrieving this file back under its original name and path
    pub fn generate_retrieval_descriptor(&self) -> RetrievalDescriptor {
        let filepath = if self.filepath.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.filepath)
        };

        RetrievalDescriptor {
            job_id: self.job_id,
            filearea: RETRIEVAL_FILEAREA.to_string(),
            filepath,
            filename: self.filename.clone(),
            mimetype: self.mimetype.clone(),
        }
    }

    /// Serialized form for the job metadata store
    pub fn to_json(&self) -> StorageResult<String> {
        serde_json::to_string(self).map_err(|e| StorageError::StorageFailure(e.to_string()))
    }

    /// Parse a persisted handle, rejecting malformed ones
    pub fn from_json(json: &str) -> StorageResult<Self> {
        serde_json::from_str(json).map_err(|e| StorageError::InvalidHandle(e.to_string()))
    }
}

/// Where and under which name a retrieved file should land
///
/// Destination policy belongs to the caller; drivers only label the returned
/// content with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalDescriptor {
    pub job_id: JobId,
    pub filearea: String,
    /// Directory path, starting and ending with `/`
    pub filepath: String,
    pub filename: String,
    pub mimetype: String,
}

impl RetrievalDescriptor {
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_filepath(mut self, filepath: &str) -> Self {
        let normalized = normalize_path(filepath);
        self.filepath = if normalized.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", normalized)
        };
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hashing::sha256_hex;

    pub(crate) fn sample_fields() -> HandleFields {
        HandleFields {
            job_id: 42,
            driver_name: "local".to_string(),
            filename: "hello.txt".to_string(),
            filepath: "foo/bar".to_string(),
            filesize: 10,
            sha256sum: sha256_hex(b"0123456789"),
            mimetype: "text/plain".to_string(),
            driver_key: "17".to_string(),
        }
    }

    #[test]
    fn test_handle_json_round_trip() {
        let handle = FileHandle::issue(sample_fields()).unwrap();
        let json = handle.to_json().unwrap();
        let parsed = FileHandle::from_json(&json).unwrap();
        assert_eq!(parsed, handle);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let object = value.as_object().unwrap();
        for field in [
            "job_id", "driver_name", "filename", "filepath", "filesize", "sha256sum", "mimetype", "driver_key",
        ] {
            assert!(object.contains_key(field), "serialized handle should contain {}", field);
        }
    }

    #[test]
    fn test_malformed_handles_are_rejected() {
        let mut fields = sample_fields();
        fields.filepath = "/foo/bar/".to_string();
        assert!(FileHandle::issue(fields).is_err());

        let mut fields = sample_fields();
        fields.filename = String::new();
        assert!(FileHandle::issue(fields).is_err());

        let mut fields = sample_fields();
        fields.sha256sum = "deadbeef".to_string();
        assert!(FileHandle::issue(fields).is_err());

        let mut fields = sample_fields();
        fields.driver_key = String::new();
        assert!(FileHandle::issue(fields).is_err());

        let json = r#"{"job_id":1,"driver_name":"local","filename":"a","filepath":"","filesize":1,
            "sha256sum":"nope","mimetype":"text/plain","driver_key":"1"}"#;
        assert!(matches!(FileHandle::from_json(json), Err(StorageError::InvalidHandle(_))));

        assert!(matches!(FileHandle::from_json("{}"), Err(StorageError::InvalidHandle(_))));
    }

    #[test]
    fn test_generate_retrieval_descriptor() {
        let handle = FileHandle::issue(sample_fields()).unwrap();
        let descriptor = handle.generate_retrieval_descriptor();
        assert_eq!(descriptor.job_id, 42);
        assert_eq!(descriptor.filearea, RETRIEVAL_FILEAREA);
        assert_eq!(descriptor.filepath, "/foo/bar/");
        assert_eq!(descriptor.filename, "hello.txt");
        assert_eq!(descriptor.mimetype, "text/plain");

        let mut fields = sample_fields();
        fields.filepath = String::new();
        let descriptor = FileHandle::issue(fields).unwrap().generate_retrieval_descriptor();
        assert_eq!(descriptor.filepath, "/");
    }

    #[test]
    fn test_retrieval_descriptor_overrides() {
        let descriptor = FileHandle::issue(sample_fields())
            .unwrap()
            .generate_retrieval_descriptor()
            .with_filename("copy.txt")
            .with_filepath("//restore/here/");
        assert_eq!(descriptor.filename, "copy.txt");
        assert_eq!(descriptor.filepath, "/restore/here/");
    }
}
