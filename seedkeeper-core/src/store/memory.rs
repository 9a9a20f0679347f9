//! In-memory store for development and tests.
//!
//! This backend is NOT secure for production use: values sit in process
//! memory unencrypted and there is no encryption-at-rest guarantee of any
//! kind. Everything is lost when the process exits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{is_valid_key, KeyValueStore, StoreError, StoreResult};

/// [`KeyValueStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.guard()?.len())
    }

    /// Returns `true` if no entries are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.guard()?.is_empty())
    }

    fn guard(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("mutex poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if !is_valid_key(key) {
            return Err(StoreError::Failure(format!("invalid store key '{key}'")));
        }
        self.guard()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.guard()?.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.guard()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.guard()?.clear();
        Ok(())
    }
}
