//! Key/value persistence for the credential records.
//!
//! The session manager is written against the [`KeyValueStore`] capability
//! set only. Two interchangeable backends are provided:
//!
//! - [`FileStore`]: durable, one atomically-written file per key.
//! - [`MemoryStore`]: best-effort development backend. **Not secure**: it
//!   offers no encryption at rest and forgets everything on exit.
//!
//! The backend is picked once, at construction, by [`StoreBackend::detect`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An individual read, write or delete failed.
    #[error("storage failure: {0}")]
    Failure(String),
}

/// Opaque string key/value persistence.
///
/// Every operation is a suspension point and may fail with
/// [`StoreError::Unavailable`] or [`StoreError::Failure`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Reads the value under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Removes every entry in this store's namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry cannot be removed.
    async fn clear(&self) -> StoreResult<()>;
}

/// Which backend a store handle was built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// [`FileStore`].
    Durable,
    /// [`MemoryStore`]. Not secure.
    Development,
}

/// A selected store backend.
#[derive(Clone)]
pub struct StoreBackend {
    kind: StoreKind,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBackend").field("kind", &self.kind).finish()
    }
}

impl StoreBackend {
    /// Picks a backend for the current environment.
    ///
    /// A data directory that can be created and written selects the durable
    /// [`FileStore`] rooted at `<data_dir>/<namespace>`. Otherwise the
    /// development [`MemoryStore`] is used and a warning is logged.
    #[must_use]
    pub fn detect(data_dir: Option<&Path>, namespace: &str) -> Self {
        if let Some(dir) = data_dir {
            match FileStore::open(dir.join(namespace)) {
                Ok(store) => {
                    log::info!("using durable file store at {}", store.directory().display());
                    return Self::durable(store);
                }
                Err(err) => {
                    log::warn!("durable store unavailable ({err}); falling back to memory store");
                }
            }
        }
        Self::development(MemoryStore::new())
    }

    /// Wraps a durable store.
    #[must_use]
    pub fn durable(store: FileStore) -> Self {
        Self {
            kind: StoreKind::Durable,
            store: Arc::new(store),
        }
    }

    /// Wraps the development store.
    #[must_use]
    pub fn development(store: MemoryStore) -> Self {
        log::warn!("using in-memory storage for development - NOT SECURE for production");
        Self {
            kind: StoreKind::Development,
            store: Arc::new(store),
        }
    }

    /// Which backend was selected.
    #[must_use]
    pub const fn kind(&self) -> StoreKind {
        self.kind
    }

    /// The store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }
}

/// Returns `true` if `key` is usable as a store key (and as a file name).
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("wallet_password_hash"));
        assert!(is_valid_key("seed-iv"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("../escape"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key(".hidden"));
    }

    #[test]
    fn test_detect_prefers_durable_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = StoreBackend::detect(Some(dir.path()), "wallet");
        assert_eq!(backend.kind(), StoreKind::Durable);
        assert!(dir.path().join("wallet").is_dir());
    }

    #[test]
    fn test_detect_falls_back_without_data_dir() {
        let backend = StoreBackend::detect(None, "wallet");
        assert_eq!(backend.kind(), StoreKind::Development);
    }

    #[test]
    fn test_detect_falls_back_when_dir_unusable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").expect("write");
        let backend = StoreBackend::detect(Some(&blocker), "wallet");
        assert_eq!(backend.kind(), StoreKind::Development);
    }
}
