//! Key/value storage backends for persisted client state
//!
//! The session layer persists a handful of string-valued keys. This module
//! defines the storage contract and the in-memory and file backends; the
//! Redis backend lives in [`crate::cache`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// A single write in a batch: `Some(value)` sets the key, `None` removes it.
pub type StorageEntry = (String, Option<String>);

/// Persisted string key/value storage
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Set a key to a value
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Apply a batch of writes.
    ///
    /// Backends that support it apply the batch as one write; the default
    /// applies entries in order.
    async fn apply(&self, batch: Vec<StorageEntry>) -> StorageResult<()> {
        for (key, value) in batch {
            match value {
                Some(value) => self.set(&key, &value).await?,
                None => self.delete(&key).await?,
            }
        }
        Ok(())
    }
}

/// Process-local storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn apply(&self, batch: Vec<StorageEntry>) -> StorageResult<()> {
        let mut entries = self.entries.lock().await;
        for (key, value) in batch {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Storage backed by a JSON object file
///
/// The whole map is kept in memory and every write rewrites the file through
/// a temporary sibling followed by a rename.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open a storage file, treating a missing file as empty
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };

        info!(
            "Opened session storage file {} ({} keys)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Wrote session storage file {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.apply(vec![(key.to_string(), Some(value.to_string()))])
            .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.apply(vec![(key.to_string(), None)]).await
    }

    async fn apply(&self, batch: Vec<StorageEntry>) -> StorageResult<()> {
        let mut entries = self.entries.lock().await;

        // Work on a copy so a failed write leaves memory and disk in agreement.
        let mut next = entries.clone();
        for (key, value) in batch {
            match value {
                Some(value) => {
                    next.insert(key, value);
                }
                None => {
                    next.remove(&key);
                }
            }
        }

        self.write_file(&next).await?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_memory_set_get_delete() -> StorageResult<()> {
        let storage = MemoryStorage::new();

        storage.set("token", "abc").await?;
        assert_eq!(storage.get("token").await?, Some("abc".to_string()));

        storage.delete("token").await?;
        assert_eq!(storage.get("token").await?, None);

        // Deleting again is fine
        storage.delete("token").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_apply_batch() -> StorageResult<()> {
        let storage = MemoryStorage::new();
        storage.set("role", "ROLE_USER").await?;

        storage
            .apply(vec![
                ("token".to_string(), Some("A".to_string())),
                ("role".to_string(), None),
            ])
            .await?;

        assert_eq!(storage.get("token").await?, Some("A".to_string()));
        assert_eq!(storage.get("role").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopen() -> StorageResult<()> {
        let path = temp_path("file-storage");

        {
            let storage = FileStorage::open(&path).await?;
            storage
                .apply(vec![
                    ("token".to_string(), Some("A".to_string())),
                    ("refresh_token".to_string(), Some("R".to_string())),
                ])
                .await?;
        }

        let reopened = FileStorage::open(&path).await?;
        assert_eq!(reopened.get("token").await?, Some("A".to_string()));
        assert_eq!(reopened.get("refresh_token").await?, Some("R".to_string()));

        reopened.delete("token").await?;
        let reopened = FileStorage::open(&path).await?;
        assert_eq!(reopened.get("token").await?, None);

        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_empty() -> StorageResult<()> {
        let path = temp_path("missing");
        let storage = FileStorage::open(&path).await?;
        assert_eq!(storage.get("token").await?, None);
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_storage_rejects_corrupt_file() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = FileStorage::open(&path).await;
        assert!(matches!(result, Err(StorageError::Serialization(_))));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
