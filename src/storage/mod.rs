//! # Storage and Persistence
//!
//! Key-value storage for the backend's configuration and role records. The
//! backend only needs get/put/delete/list over JSON-encoded entries, so the
//! store is a small trait with an in-memory implementation (tests, single
//! process deployments) and a PostgreSQL implementation.
//!
//! Keys are `/`-separated paths. [`Storage::list`] follows the usual
//! hierarchical semantics: listing `roles/` returns the immediate children of
//! that prefix, with nested "folders" reported once with a trailing `/`.

pub mod memory;
pub mod postgres;

#[cfg(all(test, feature = "postgres_tests"))]
pub(crate) mod test_helpers;

pub use memory::InMemoryStorage;
pub use postgres::PgStorage;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Entry could not be encoded or decoded.
    #[error("failed to decode entry '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Database driver failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A raw stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Encode `value` as JSON under `key`.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> StorageResult<Self> {
        let key = key.into();
        let value = serde_json::to_vec(value)
            .map_err(|source| StorageError::Codec { key: key.clone(), source })?;
        Ok(Self { key, value })
    }

    /// Decode the JSON value of this entry.
    pub fn decode_json<T: DeserializeOwned>(&self) -> StorageResult<T> {
        serde_json::from_slice(&self.value)
            .map_err(|source| StorageError::Codec { key: self.key.clone(), source })
    }
}

/// Key-value store used for configuration and role records.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Fetch an entry; `None` when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>>;

    /// Insert or overwrite an entry.
    async fn put(&self, entry: StorageEntry) -> StorageResult<()>;

    /// Delete an entry. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List the immediate children of `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Reduce full keys to the immediate children of `prefix`.
///
/// `roles/a` and `roles/b/c` under `roles/` become `a` and `b/`.
pub(crate) fn immediate_children<'a, I>(prefix: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut children: Vec<String> = keys
        .into_iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.find('/') {
            Some(idx) => rest[..=idx].to_string(),
            None => rest.to_string(),
        })
        .collect();
    children.sort();
    children.dedup();
    children
}
