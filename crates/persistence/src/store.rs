//! Atomic JSON snapshot store.
//!
//! Snapshots are written to a temp file in the target directory and renamed
//! into place, so readers never observe a torn file. Serialization and IO
//! run on the blocking pool.

use crate::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File-backed JSON snapshot for a single value.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the snapshot, `Ok(None)` if the file does not exist.
    pub async fn load<T: DeserializeOwned + Send + 'static>(
        &self,
    ) -> Result<Option<T>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<T>, StorageError> {
            let raw = std::fs::read_to_string(&path)?;
            Ok(Some(serde_json::from_str(&raw)?))
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Atomically replace the snapshot.
    pub async fn save<T: Serialize + Send + Sync + 'static>(
        &self,
        value: T,
    ) -> Result<(), StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            serde_json::to_writer(&mut tmp, &value)?;
            tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Snapshot {
        version: u32,
        entries: Vec<String>,
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("snapshot.json"));

        assert_eq!(store.load::<Snapshot>().await.unwrap(), None);

        let snapshot = Snapshot {
            version: 1,
            entries: vec!["a".into(), "b".into()],
        };
        store.save(snapshot.clone()).await.unwrap();

        let loaded = store.load::<Snapshot>().await.unwrap();
        assert_eq!(loaded, Some(snapshot));
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("nested/deep/snapshot.json"));
        store
            .save(Snapshot {
                version: 2,
                entries: vec![],
            })
            .await
            .unwrap();
        assert!(store.exists());
    }
}
