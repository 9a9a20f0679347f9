//! The fixed set of credential records kept in the [`KeyValueStore`].
//!
//! Five records make up an initialized wallet. They are written together by
//! `initialize` and removed together by `clear`; any other combination is a
//! partial (corrupt) state and is reported as such.

use std::fmt;

use crate::crypto::{decode_fixed, PasswordDigest, Salt, NONCE_LEN};
use crate::error::{WalletError, WalletResult};
use crate::store::KeyValueStore;

/// One of the five persisted credential records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Hex SHA-256 verification digest of the password.
    PasswordHash,
    /// Hex salt used for the verification digest.
    PasswordSalt,
    /// Hex AES-GCM ciphertext of the seed.
    EncryptedSeed,
    /// Hex AES-GCM nonce for the seed ciphertext.
    SeedIv,
    /// Hex salt used to derive the seed encryption key.
    SeedSalt,
}

impl RecordKey {
    /// All records, in write order. The password hash goes last so that a
    /// crash mid-write never leaves a verifiable password without a seed.
    pub const ALL: [Self; 5] = [
        Self::SeedSalt,
        Self::SeedIv,
        Self::EncryptedSeed,
        Self::PasswordSalt,
        Self::PasswordHash,
    ];

    /// The key under which this record is stored.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::PasswordHash => "wallet_password_hash",
            Self::PasswordSalt => "wallet_password_salt",
            Self::EncryptedSeed => "wallet_encrypted_seed",
            Self::SeedIv => "wallet_seed_iv",
            Self::SeedSalt => "wallet_seed_salt",
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Decoded credential records of an initialized wallet.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    /// Password verification digest.
    pub password_hash: PasswordDigest,
    /// Salt for the verification digest.
    pub password_salt: Salt,
    /// Seed ciphertext including the GCM tag.
    pub encrypted_seed: Vec<u8>,
    /// Nonce for the seed ciphertext.
    pub seed_iv: [u8; NONCE_LEN],
    /// Salt for the seed encryption key.
    pub seed_salt: Salt,
}

/// What the store currently holds.
#[derive(Debug)]
pub enum RecordSet {
    /// No credential record exists.
    Empty,
    /// All five records exist and decode.
    Complete(Box<StoredCredentials>),
    /// Some records exist, others are missing.
    Partial {
        /// Records found.
        present: Vec<RecordKey>,
        /// Records missing.
        missing: Vec<RecordKey>,
    },
}

impl RecordSet {
    /// Converts a non-complete set into the matching error.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::WalletNotInitialized`] for an empty store and
    /// [`WalletError::PartialInitialization`] for a partial one.
    pub fn into_complete(self) -> WalletResult<StoredCredentials> {
        match self {
            Self::Complete(credentials) => Ok(*credentials),
            Self::Empty => Err(WalletError::WalletNotInitialized),
            Self::Partial { present, missing } => {
                Err(WalletError::PartialInitialization { present, missing })
            }
        }
    }
}

/// Typed access to the credential records of one store.
pub struct CredentialRecords<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> CredentialRecords<'a> {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Reads a single raw record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get(&self, key: RecordKey) -> WalletResult<Option<String>> {
        Ok(self.store.get(key.storage_key()).await?)
    }

    /// Returns `true` if the password hash record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn has_password_hash(&self) -> WalletResult<bool> {
        Ok(self.get(RecordKey::PasswordHash).await?.is_some())
    }

    /// Reads all five records and classifies the result.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails or a present record does not decode.
    pub async fn inspect(&self) -> WalletResult<RecordSet> {
        let mut values = Vec::with_capacity(RecordKey::ALL.len());
        for key in RecordKey::ALL {
            values.push((key, self.get(key).await?));
        }

        let (present, missing): (Vec<_>, Vec<_>) =
            values.iter().partition(|(_, value)| value.is_some());
        if missing.is_empty() {
            return decode_all(&values).map(|credentials| RecordSet::Complete(Box::new(credentials)));
        }
        if present.is_empty() {
            return Ok(RecordSet::Empty);
        }
        Ok(RecordSet::Partial {
            present: present.iter().map(|(key, _)| *key).collect(),
            missing: missing.iter().map(|(key, _)| *key).collect(),
        })
    }

    /// Writes all five records in [`RecordKey::ALL`] order.
    ///
    /// On failure, the records already written are removed again. If that
    /// rollback also fails the store is left partial and
    /// [`inspect`](Self::inspect) will report it.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing write.
    pub async fn persist(&self, credentials: &StoredCredentials) -> WalletResult<()> {
        let mut written = Vec::with_capacity(RecordKey::ALL.len());
        for key in RecordKey::ALL {
            let value = encode(credentials, key);
            if let Err(err) = self.store.set(key.storage_key(), &value).await {
                log::warn!("writing {key} failed; rolling back {} record(s)", written.len());
                self.rollback(&written).await;
                return Err(err.into());
            }
            written.push(key);
        }
        Ok(())
    }

    async fn rollback(&self, written: &[RecordKey]) {
        for key in written.iter().rev() {
            if let Err(err) = self.store.remove(key.storage_key()).await {
                log::warn!("rollback of {key} failed: {err}; store left partially initialized");
            }
        }
    }
}

fn encode(credentials: &StoredCredentials, key: RecordKey) -> String {
    match key {
        RecordKey::PasswordHash => credentials.password_hash.to_hex(),
        RecordKey::PasswordSalt => credentials.password_salt.to_hex(),
        RecordKey::EncryptedSeed => hex::encode(&credentials.encrypted_seed),
        RecordKey::SeedIv => hex::encode(credentials.seed_iv),
        RecordKey::SeedSalt => credentials.seed_salt.to_hex(),
    }
}

fn decode_all(values: &[(RecordKey, Option<String>)]) -> WalletResult<StoredCredentials> {
    let value = |wanted: RecordKey| -> &str {
        values
            .iter()
            .find(|(key, _)| *key == wanted)
            .and_then(|(_, value)| value.as_deref())
            .unwrap_or_default()
    };
    let corrupted = |key: RecordKey| move |reason: String| WalletError::CorruptedRecord { key, reason };

    let encrypted_seed = hex::decode(value(RecordKey::EncryptedSeed))
        .map_err(|err| corrupted(RecordKey::EncryptedSeed)(err.to_string()))?;
    if encrypted_seed.is_empty() {
        return Err(corrupted(RecordKey::EncryptedSeed)("empty ciphertext".to_string()));
    }

    Ok(StoredCredentials {
        password_hash: PasswordDigest::from_hex(value(RecordKey::PasswordHash))
            .map_err(corrupted(RecordKey::PasswordHash))?,
        password_salt: Salt::from_hex(value(RecordKey::PasswordSalt))
            .map_err(corrupted(RecordKey::PasswordSalt))?,
        encrypted_seed,
        seed_iv: decode_fixed(value(RecordKey::SeedIv)).map_err(corrupted(RecordKey::SeedIv))?,
        seed_salt: Salt::from_hex(value(RecordKey::SeedSalt))
            .map_err(corrupted(RecordKey::SeedSalt))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_salt, hash_password};
    use crate::store::MemoryStore;

    fn sample_credentials() -> StoredCredentials {
        let password_salt = generate_salt();
        StoredCredentials {
            password_hash: hash_password("hunter2", &password_salt),
            password_salt,
            encrypted_seed: vec![0xAB; 40],
            seed_iv: [0x01; NONCE_LEN],
            seed_salt: generate_salt(),
        }
    }

    #[test]
    fn test_storage_keys_are_namespaced() {
        for key in RecordKey::ALL {
            assert!(key.storage_key().starts_with("wallet_"));
        }
        assert_eq!(RecordKey::ALL.last(), Some(&RecordKey::PasswordHash));
    }

    #[tokio::test]
    async fn test_inspect_empty_store() {
        let store = MemoryStore::new();
        let records = CredentialRecords::new(&store);
        assert!(matches!(records.inspect().await.unwrap(), RecordSet::Empty));
        assert!(!records.has_password_hash().await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_then_inspect() {
        let store = MemoryStore::new();
        let records = CredentialRecords::new(&store);
        let credentials = sample_credentials();
        records.persist(&credentials).await.unwrap();

        let loaded = records.inspect().await.unwrap().into_complete().unwrap();
        assert_eq!(loaded.password_hash, credentials.password_hash);
        assert_eq!(loaded.password_salt, credentials.password_salt);
        assert_eq!(loaded.encrypted_seed, credentials.encrypted_seed);
        assert_eq!(loaded.seed_iv, credentials.seed_iv);
        assert_eq!(loaded.seed_salt, credentials.seed_salt);
        assert_eq!(store.len().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_inspect_reports_partial_state() {
        let store = MemoryStore::new();
        store
            .set(RecordKey::PasswordHash.storage_key(), &"00".repeat(32))
            .await
            .unwrap();
        let records = CredentialRecords::new(&store);

        match records.inspect().await.unwrap().into_complete() {
            Err(WalletError::PartialInitialization { present, missing }) => {
                assert_eq!(present, vec![RecordKey::PasswordHash]);
                assert_eq!(missing.len(), 4);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inspect_rejects_corrupted_record() {
        let store = MemoryStore::new();
        let records = CredentialRecords::new(&store);
        records.persist(&sample_credentials()).await.unwrap();
        store.set(RecordKey::SeedIv.storage_key(), "abcd").await.unwrap();

        match records.inspect().await {
            Err(WalletError::CorruptedRecord { key, .. }) => assert_eq!(key, RecordKey::SeedIv),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
