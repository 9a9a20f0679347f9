#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Password-gated storage for a wallet recovery seed.
//!
//! A [`SessionManager`] keeps the seed encrypted under a key derived from the
//! user's password and moves between three phases: no wallet, locked and
//! unlocked. The session key exists only while unlocked and is dropped by
//! [`SessionManager::lock`], by [`SessionManager::clear`] or when the
//! auto-lock timer fires.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use seedkeeper_core::{ExposeSecret, MemoryStore, SessionManager, WalletConfig};
//!
//! # async fn demo() -> seedkeeper_core::WalletResult<()> {
//! let manager = SessionManager::new(Arc::new(MemoryStore::new()), WalletConfig::default())?;
//! manager.check_initialization().await;
//!
//! manager.try_initialize("hunter2", "define wheel flash ...").await?;
//! manager.lock().await;
//!
//! manager.try_unlock("hunter2").await?;
//! let seed = manager.get_seed_phrase().await?;
//! assert!(seed.expose_secret().starts_with("define"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub use config::WalletConfig;

pub mod crypto;

mod error;
pub use error::*;

pub mod logger;

pub mod records;
pub use records::RecordKey;

mod session;
pub use session::SessionManager;

mod state;
pub use state::*;

pub mod store;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreBackend, StoreKind};

// private modules
mod timer;

pub use secrecy::{ExposeSecret, SecretString};
