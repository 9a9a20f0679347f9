//! Error types for the seed store.

use thiserror::Error;

use crate::records::RecordKey;
use crate::store::StoreError;

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors raised by the session manager and the layers beneath it.
///
/// The `Display` output of each variant is the human-readable message that
/// ends up in [`WalletState::error`](crate::WalletState::error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// The storage backend cannot be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The storage backend failed while reading or writing.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// No password credential exists in storage.
    #[error("Wallet not initialized")]
    WalletNotInitialized,

    /// A wallet already exists; it must be cleared before re-initializing.
    #[error("Wallet already initialized")]
    AlreadyInitialized,

    /// The supplied password does not match the stored credential.
    #[error("Invalid password")]
    InvalidPassword,

    /// The operation requires an unlocked wallet.
    #[error("Wallet is locked")]
    WalletLocked,

    /// The encrypted seed or its nonce is missing from storage.
    #[error("Seed phrase not found")]
    SeedNotFound,

    /// The seed ciphertext failed authentication under the session key.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// Some, but not all, credential records are present in storage.
    #[error("partial initialization: present {present:?}, missing {missing:?}")]
    PartialInitialization {
        /// Records found in storage.
        present: Vec<RecordKey>,
        /// Records expected but absent.
        missing: Vec<RecordKey>,
    },

    /// A stored record exists but cannot be decoded.
    #[error("corrupted record '{key}': {reason}")]
    CorruptedRecord {
        /// The offending record.
        key: RecordKey,
        /// Why it was rejected.
        reason: String,
    },

    /// Cryptographic failures other than authentication (encryption, RNG).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The configuration cannot be used.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for WalletError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(message) => Self::StorageUnavailable(message),
            StoreError::Failure(message) => Self::StorageFailure(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_wallet_errors() {
        let err: WalletError = StoreError::Unavailable("no backend".to_string()).into();
        assert_eq!(err, WalletError::StorageUnavailable("no backend".to_string()));

        let err: WalletError = StoreError::Failure("disk full".to_string()).into();
        assert_eq!(err, WalletError::StorageFailure("disk full".to_string()));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(WalletError::InvalidPassword.to_string(), "Invalid password");
        assert_eq!(WalletError::WalletLocked.to_string(), "Wallet is locked");
        let err = WalletError::PartialInitialization {
            present: vec![RecordKey::SeedSalt],
            missing: vec![RecordKey::PasswordHash],
        };
        assert!(err.to_string().contains("partial initialization"));
    }
}
