//! Cryptographic primitives for the seed store.
//!
//! This module is stateless. It provides:
//!
//! - random salts ([`generate_salt`]),
//! - the password verification digest ([`hash_password`], SHA-256),
//! - password-based key derivation ([`derive_key`], PBKDF2-HMAC-SHA256),
//! - AES-256-GCM encryption of the seed ([`encrypt`] / [`decrypt`]).
//!
//! # Salt encoding
//!
//! Salts are persisted as lowercase hex and both the digest and the KDF
//! consume the *hex text* of the salt, not its raw bytes. This keeps records
//! written by earlier browser builds of the wallet readable.
//!
//! # Security
//!
//! The verification digest is a single fast hash. It is not a memory-hard
//! password hash and offers little resistance to offline guessing if the
//! records leak. The encryption key is derived under an independent salt so
//! the stored digest never doubles as key material.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use hmac::Hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{WalletError, WalletResult};

/// Length of a salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of an AES-GCM nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Length of the symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Length of the password digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Default PBKDF2 round count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Random per-secret salt.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Creates a salt from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a hex-encoded salt.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `encoded` is not exactly
    /// [`SALT_LEN`] hex-encoded bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, String> {
        decode_fixed(encoded).map(Self)
    }

    /// Hex encoding, as persisted.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw salt bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Salt").field(&self.to_hex()).finish()
    }
}

/// One-way verification digest of a password.
///
/// Equality is evaluated in constant time.
#[derive(Clone)]
pub struct PasswordDigest([u8; DIGEST_LEN]);

impl PasswordDigest {
    /// Parses a hex-encoded digest.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `encoded` is not a 32-byte hex string.
    pub fn from_hex(encoded: &str) -> Result<Self, String> {
        decode_fixed(encoded).map(Self)
    }

    /// Hex encoding, as persisted.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl ConstantTimeEq for PasswordDigest {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for PasswordDigest {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for PasswordDigest {}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigest")
            .field("digest", &"[REDACTED]")
            .finish()
    }
}

/// Symmetric session key (256-bit) derived from a password and seed salt.
///
/// The key never leaves the crate: it has no byte accessor, is neither
/// `Clone` nor serializable, and is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    #[cfg(test)]
    pub(crate) const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generates a fresh random salt from the OS CSPRNG.
#[must_use]
pub fn generate_salt() -> Salt {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut bytes);
    Salt(bytes)
}

/// Computes `SHA-256(password || hex(salt))`.
///
/// Only used to verify a password, never as key material. A single fast
/// hash is cheap to brute-force offline if the records leak; the seed itself
/// is protected by [`derive_key`].
#[must_use]
pub fn hash_password(password: &str, salt: &Salt) -> PasswordDigest {
    let salt_hex = salt.to_hex();
    let digest = Sha256::new()
        .chain_update(password.as_bytes())
        .chain_update(salt_hex.as_bytes())
        .finalize();
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(&digest);
    PasswordDigest(bytes)
}

/// Derives the 256-bit session key with PBKDF2-HMAC-SHA256.
///
/// The same `(password, salt, iterations)` always yields the same key.
///
/// # Errors
///
/// Returns [`WalletError::Crypto`] if `iterations` is zero or the KDF
/// rejects its parameters.
pub fn derive_key(password: &str, salt: &Salt, iterations: u32) -> WalletResult<SessionKey> {
    if iterations == 0 {
        return Err(WalletError::Crypto("KDF iteration count must be non-zero".to_string()));
    }
    let salt_hex = salt.to_hex();
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt_hex.as_bytes(), iterations, &mut key)
        .map_err(|err| WalletError::Crypto(format!("PBKDF2 failed: {err}")))?;
    let session_key = SessionKey(key);
    key.zeroize();
    Ok(session_key)
}

/// Generates a random 96-bit nonce.
fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` with AES-256-GCM under a fresh random nonce.
///
/// # Returns
///
/// A tuple of (ciphertext with auth tag, nonce). The nonce must be stored
/// alongside the ciphertext.
///
/// # Errors
///
/// Returns [`WalletError::Crypto`] if encryption fails.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> WalletResult<(Vec<u8>, [u8; NONCE_LEN])> {
    let nonce_bytes = generate_nonce();
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| WalletError::Crypto("AES-256-GCM encryption failed".to_string()))?;
    Ok((ciphertext, nonce_bytes))
}

/// Decrypts and authenticates `ciphertext`.
///
/// # Errors
///
/// Returns [`WalletError::DecryptionFailure`] if the tag does not verify:
/// wrong key, wrong nonce or tampered ciphertext.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    key: &SessionKey,
) -> WalletResult<Zeroizing<Vec<u8>>> {
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| {
            WalletError::DecryptionFailure("AES-256-GCM authentication failed".to_string())
        })
}

/// Decodes a hex string into a fixed-size array.
pub(crate) fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(encoded).map_err(|err| err.to_string())?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| format!("expected {N} bytes, got {}", bytes.len()))
}
