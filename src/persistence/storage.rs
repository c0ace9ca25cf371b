//! Pluggable storage backends

use crate::error::WizardError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;

/// Key-value string storage for persisted wizard state
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a value; `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, WizardError>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> Result<(), WizardError>;

    /// Delete a value; deleting an absent key is not an error
    async fn remove(&self, key: &str) -> Result<(), WizardError>;
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, WizardError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WizardError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WizardError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Backend that stores nothing
///
/// Used where persistence is configured but intentionally inert, for
/// instance in tests or headless environments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStorage;

#[async_trait]
impl StorageBackend for NullStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>, WizardError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), WizardError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), WizardError> {
        Ok(())
    }
}

/// File-per-key backend rooted at a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a backend rooted at `root`; the directory is created on
    /// first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys become file names; path separators are not allowed
        let safe: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, WizardError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WizardError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WizardError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
