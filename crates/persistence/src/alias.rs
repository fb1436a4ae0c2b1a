//! Learned aliases for areas and entities.
//!
//! Two maps persisted together: user strings to canonical area names, and
//! user strings to entity ids. Keys are case-folded and trimmed. The store
//! loads lazily and writes through on every new mapping.

use crate::store::JsonStore;
use crate::StorageError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct AliasData {
    #[serde(default)]
    areas: BTreeMap<String, String>,
    #[serde(default)]
    entities: BTreeMap<String, String>,
}

/// Persistent alias memory.
pub struct AliasStore {
    store: JsonStore,
    data: RwLock<Option<AliasData>>,
}

fn fold(key: &str) -> String {
    key.trim().to_lowercase()
}

impl AliasStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
            data: RwLock::new(None),
        }
    }

    async fn ensure_loaded(&self) -> Result<(), StorageError> {
        if self.data.read().is_some() {
            return Ok(());
        }
        let loaded = self.store.load::<AliasData>().await?.unwrap_or_default();
        *self.data.write() = Some(loaded);
        Ok(())
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let snapshot = self.data.read().clone().unwrap_or_default();
        self.store.save(snapshot).await
    }

    pub async fn area_alias(&self, text: &str) -> Result<Option<String>, StorageError> {
        self.ensure_loaded().await?;
        Ok(self
            .data
            .read()
            .as_ref()
            .and_then(|d| d.areas.get(&fold(text)).cloned()))
    }

    pub async fn learn_area_alias(
        &self,
        text: &str,
        area_name: &str,
    ) -> Result<(), StorageError> {
        self.ensure_loaded().await?;
        let key = fold(text);
        let changed = {
            let mut guard = self.data.write();
            let data = guard.get_or_insert_with(AliasData::default);
            if data.areas.get(&key).map(String::as_str) != Some(area_name) {
                data.areas.insert(key.clone(), area_name.to_string());
                true
            } else {
                false
            }
        };
        if changed {
            tracing::info!(alias = %key, area = %area_name, "learned area alias");
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn entity_alias(&self, text: &str) -> Result<Option<String>, StorageError> {
        self.ensure_loaded().await?;
        Ok(self
            .data
            .read()
            .as_ref()
            .and_then(|d| d.entities.get(&fold(text)).cloned()))
    }

    pub async fn learn_entity_alias(
        &self,
        text: &str,
        entity_id: &str,
    ) -> Result<(), StorageError> {
        self.ensure_loaded().await?;
        let key = fold(text);
        let changed = {
            let mut guard = self.data.write();
            let data = guard.get_or_insert_with(AliasData::default);
            if data.entities.get(&key).map(String::as_str) != Some(entity_id) {
                data.entities.insert(key.clone(), entity_id.to_string());
                true
            } else {
                false
            }
        };
        if changed {
            tracing::info!(alias = %key, entity = %entity_id, "learned entity alias");
            self.persist().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_learn_and_recall_area_alias() {
        let dir = tempfile::tempdir().unwrap();
        let store = AliasStore::new(dir.path().join("memory.json"));

        assert_eq!(store.area_alias("Ki-Bad").await.unwrap(), None);
        store
            .learn_area_alias("Ki-Bad", "Kinder Badezimmer")
            .await
            .unwrap();

        // Case-folded lookup.
        assert_eq!(
            store.area_alias("ki-bad").await.unwrap(),
            Some("Kinder Badezimmer".to_string())
        );
        assert_eq!(
            store.area_alias("  KI-BAD ").await.unwrap(),
            Some("Kinder Badezimmer".to_string())
        );
    }

    #[tokio::test]
    async fn test_aliases_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        {
            let store = AliasStore::new(&path);
            store
                .learn_entity_alias("Spiegellicht", "light.bad_spiegel")
                .await
                .unwrap();
        }

        let reloaded = AliasStore::new(&path);
        assert_eq!(
            reloaded.entity_alias("spiegellicht").await.unwrap(),
            Some("light.bad_spiegel".to_string())
        );
    }
}
