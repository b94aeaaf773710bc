//! Access to the stored connection configuration.

use std::sync::Arc;

use crate::domain::{StoredConfig, CONFIG_KEY};
use crate::storage::{Storage, StorageEntry, StorageResult};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self) -> StorageResult<Option<StoredConfig>> {
        match self.storage.get(CONFIG_KEY).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, config: &StoredConfig) -> StorageResult<()> {
        self.storage.put(StorageEntry::json(CONFIG_KEY, config)?).await
    }

    pub async fn delete(&self) -> StorageResult<()> {
        self.storage.delete(CONFIG_KEY).await
    }
}
