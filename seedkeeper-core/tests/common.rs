//! Common test utilities shared across integration tests.
#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use seedkeeper_core::store::{StoreError, StoreResult};
use seedkeeper_core::{KeyValueStore, MemoryStore, SessionManager, WalletConfig};
use tokio::sync::Semaphore;

pub const SEED: &str =
    "define wheel flash blanket okay hybrid quiz rabbit pizza basket outer ghost";

/// Installs a fmt subscriber once per test binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Fast key derivation; the default round count only slows the suite down.
pub fn test_config() -> WalletConfig {
    WalletConfig::default().with_kdf_iterations(1_000)
}

#[allow(dead_code, reason = "used in tests")]
pub fn memory_manager() -> (SessionManager, Arc<MemoryStore>) {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(store.clone(), test_config()).expect("manager");
    (manager, store)
}

/// Memory store that fails the n-th `set` (1-based) and, optionally, `clear`.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_set_at: Option<usize>,
    sets: AtomicUsize,
    fail_clear: AtomicBool,
}

#[allow(dead_code, reason = "used in tests")]
impl FlakyStore {
    pub fn failing_set(nth: usize) -> Self {
        Self {
            fail_set_at: Some(nth),
            ..Self::default()
        }
    }

    pub fn failing_clear() -> Self {
        let store = Self::default();
        store.fail_clear.store(true, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let call = self.sets.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_set_at == Some(call) {
            return Err(StoreError::Failure(format!("disk full writing {key}")));
        }
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("keychain locked".to_string()));
        }
        self.inner.clear().await
    }
}

/// Memory store whose reads block on a gate while it is closed, so a test
/// can observe a manager mid-operation.
pub struct GatedStore {
    pub inner: MemoryStore,
    closed: AtomicBool,
    permits: Semaphore,
}

impl Default for GatedStore {
    fn default() -> Self {
        Self {
            inner: MemoryStore::new(),
            closed: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }
}

#[allow(dead_code, reason = "used in tests")]
impl GatedStore {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.permits.add_permits(1024);
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.closed.load(Ordering::SeqCst) {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        }
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.inner.clear().await
    }
}
