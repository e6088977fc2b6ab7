//! Keyed string storage with the semantics of a browser's local storage:
//! values are opaque strings, a missing key reads as `None`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage; lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).map(|v| v.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }
}

/// One file per key under a directory, so state outlives the process. File
/// names are the hex-encoded key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "File storage opened");
        Ok(Self { dir })
    }

    // Hex of the key bytes: distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key.as_bytes())))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);
        storage.set_item("k", "[\"a\"]").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("[\"a\"]"));
        storage.set_item("k", "[]").unwrap();
        assert_eq!(storage.len(), 1);
        storage.remove_item("k").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.set_item("jb-triggered-steps-c/1", "[\"s1\"]").unwrap();
        }
        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get_item("jb-triggered-steps-c/1").unwrap().as_deref(),
            Some("[\"s1\"]")
        );
        assert_eq!(reopened.get_item("other").unwrap(), None);

        reopened.remove_item("jb-triggered-steps-c/1").unwrap();
        reopened.remove_item("jb-triggered-steps-c/1").unwrap();
        assert_eq!(reopened.get_item("jb-triggered-steps-c/1").unwrap(), None);
    }

    #[test]
    fn test_file_storage_keeps_similar_keys_apart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set_item("jb-triggered-steps-conv.1", "[\"s1\"]").unwrap();

        assert_eq!(storage.get_item("jb-triggered-steps-conv_1").unwrap(), None);
        assert_eq!(storage.get_item("jb-triggered-steps-conv/1").unwrap(), None);
        storage.set_item("jb-triggered-steps-conv_1", "[]").unwrap();
        assert_eq!(
            storage.get_item("jb-triggered-steps-conv.1").unwrap().as_deref(),
            Some("[\"s1\"]")
        );
    }
}
