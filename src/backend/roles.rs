//! Role records in the key-value store.
//!
//! Writes validate the record first and persist nothing on failure. Reads
//! trust what is stored.

use std::sync::Arc;

use crate::domain::{normalize_role_name, role_key, RoleRecord, ROLE_PREFIX};
use crate::errors::{Error, Result};
use crate::storage::{Storage, StorageEntry};

#[derive(Debug, Clone)]
pub struct RoleStore {
    storage: Arc<dyn Storage>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, name: &str) -> Result<Option<RoleRecord>> {
        let name = checked_name(name)?;
        match self.storage.get(&role_key(&name)).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Validate and persist a role.
    pub async fn put(&self, name: &str, role: &RoleRecord) -> Result<()> {
        let name = checked_name(name)?;
        role.validate()?;
        self.storage.put(StorageEntry::json(role_key(&name), role)?).await?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let name = checked_name(name)?;
        self.storage.delete(&role_key(&name)).await?;
        Ok(())
    }

    /// Role names, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.storage.list(ROLE_PREFIX).await?)
    }
}

fn checked_name(name: &str) -> Result<String> {
    let name = normalize_role_name(name);
    if name.is_empty() || name.contains('/') {
        return Err(Error::validation_field(format!("invalid role name '{}'", name), "name"));
    }
    Ok(name)
}
