//! The lock/unlock state machine exposed to callers.
//!
//! [`SessionManager`] is the only component callers talk to. It combines the
//! crypto primitives, the credential records and the store into the
//! `Uninitialized` / `Locked` / `Unlocked` lifecycle, holds the session key
//! while unlocked and owns the auto-lock timer.
//!
//! # Concurrency
//!
//! All operations are serialized through a single async mutex, so two
//! concurrent `unlock` or `initialize` calls run one after the other and can
//! never interleave their store writes or swap session keys underneath each
//! other. The published [`WalletState`] is readable without taking that
//! mutex, which is how callers observe `is_loading` mid-operation.

use std::sync::{Arc, Weak};

use secrecy::SecretString;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use zeroize::{Zeroize, Zeroizing};

use crate::config::WalletConfig;
use crate::crypto::{decode_fixed, decrypt, derive_key, encrypt, generate_salt, hash_password};
use crate::crypto::{Salt, SessionKey, NONCE_LEN};
use crate::error::{WalletError, WalletResult};
use crate::records::{CredentialRecords, RecordKey, RecordSet, StoredCredentials};
use crate::state::{Phase, Transition, WalletState};
use crate::store::{KeyValueStore, StoreBackend};
use crate::timer::AutoLockTimer;

/// Mutable state guarded by the operation mutex.
struct Machine {
    state: WalletState,
    session: Option<SessionKey>,
    timer: AutoLockTimer,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    config: WalletConfig,
    machine: Mutex<Machine>,
    published: watch::Sender<WalletState>,
}

impl Inner {
    fn records(&self) -> CredentialRecords<'_> {
        CredentialRecords::new(self.store.as_ref())
    }

    fn publish(&self, machine: &mut Machine, transition: Transition) {
        log::debug!("wallet transition: {}", label(&transition));
        machine.state = machine.state.apply(transition);
        self.published.send_replace(machine.state.clone());
    }

    /// Drops the session key and cancels the timer.
    fn end_session(machine: &mut Machine) {
        machine.session = None;
        machine.timer.cancel();
    }

    async fn expire(&self, epoch: u64) {
        let mut machine = self.machine.lock().await;
        if !machine.timer.take_fired(epoch) {
            return;
        }
        log::info!("auto-lock timeout reached; locking wallet");
        machine.session = None;
        self.publish(&mut machine, Transition::Locked);
    }
}

/// Runs the KDF on the blocking pool, so timers and observers on the same
/// runtime keep making progress while the key is derived.
async fn derive_session_key(password: &str, salt: Salt, iterations: u32) -> WalletResult<SessionKey> {
    let password = Zeroizing::new(password.to_owned());
    tokio::task::spawn_blocking(move || derive_key(&password, &salt, iterations))
        .await
        .map_err(|err| WalletError::Crypto(format!("key derivation task failed: {err}")))?
}

/// Short name of a transition for debug logs.
fn label(transition: &Transition) -> &'static str {
    match transition {
        Transition::Begin => "begin",
        Transition::Checked { initialized: true } => "checked(initialized)",
        Transition::Checked { initialized: false } => "checked(uninitialized)",
        Transition::Initialized => "initialized",
        Transition::Unlocked => "unlocked",
        Transition::Locked => "locked",
        Transition::Cleared => "cleared",
        Transition::Failed(_) => "failed",
        Transition::Settled => "settled",
    }
}

/// Password-gated access to the wallet seed.
///
/// Operations that report success as `bool` ([`initialize`](Self::initialize),
/// [`unlock`](Self::unlock)) record the failure in [`WalletState::error`];
/// their `try_` counterparts return the typed [`WalletError`] as well.
///
/// Must be used from within a Tokio runtime: the auto-lock timer is a
/// spawned task.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager over `store`. Call
    /// [`check_initialization`](Self::check_initialization) before use.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidConfig`] if `config` does not validate.
    pub fn new(store: Arc<dyn KeyValueStore>, config: WalletConfig) -> WalletResult<Self> {
        config.validate()?;
        let state = WalletState::default();
        let (published, _) = watch::channel(state.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config,
                machine: Mutex::new(Machine {
                    state,
                    session: None,
                    timer: AutoLockTimer::default(),
                }),
                published,
            }),
        })
    }

    /// Creates a manager over a detected backend.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidConfig`] if `config` does not validate.
    pub fn from_backend(backend: &StoreBackend, config: WalletConfig) -> WalletResult<Self> {
        Self::new(backend.store(), config)
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> WalletState {
        self.inner.published.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.inner.published.subscribe()
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &WalletConfig {
        &self.inner.config
    }

    /// When the armed auto-lock timer will fire, if one is armed.
    pub async fn auto_lock_deadline(&self) -> Option<Instant> {
        self.inner.machine.lock().await.timer.deadline()
    }

    /// Refreshes the state from storage.
    ///
    /// An existing wallet always comes back `Locked`; any session key held
    /// is dropped.
    pub async fn check_initialization(&self) {
        let _ = self.try_check_initialization().await;
    }

    /// Like [`check_initialization`](Self::check_initialization), returning
    /// the resulting phase.
    ///
    /// # Errors
    ///
    /// Returns a storage error, [`WalletError::PartialInitialization`] if
    /// only some records exist, or [`WalletError::CorruptedRecord`].
    pub async fn try_check_initialization(&self) -> WalletResult<Phase> {
        let mut machine = self.inner.machine.lock().await;
        self.inner.publish(&mut machine, Transition::Begin);

        Inner::end_session(&mut machine);
        match self.inner.records().inspect().await {
            Ok(set) => {
                let initialized = matches!(set, RecordSet::Complete(_));
                self.inner.publish(&mut machine, Transition::Checked { initialized });
                match set.into_complete() {
                    Ok(_) | Err(WalletError::WalletNotInitialized) => Ok(machine.state.phase()),
                    Err(err) => {
                        log::warn!("credential records incomplete: {err}");
                        self.fail(&mut machine, err)
                    }
                }
            }
            Err(err) => {
                self.inner.publish(&mut machine, Transition::Locked);
                self.fail(&mut machine, err)
            }
        }
    }

    /// Creates a wallet protecting `seed` with `password` and unlocks it.
    ///
    /// Returns `false` on failure; read [`WalletState::error`] for the reason.
    pub async fn initialize(&self, password: &str, seed: &str) -> bool {
        self.try_initialize(password, seed).await.is_ok()
    }

    /// Like [`initialize`](Self::initialize), returning the typed error.
    ///
    /// # Errors
    ///
    /// - [`WalletError::AlreadyInitialized`] if a wallet exists (clear it first)
    /// - [`WalletError::PartialInitialization`] if leftover records exist
    /// - [`WalletError::StorageFailure`] if a record cannot be written; the
    ///   records written so far are rolled back
    pub async fn try_initialize(&self, password: &str, seed: &str) -> WalletResult<()> {
        let mut machine = self.inner.machine.lock().await;
        self.inner.publish(&mut machine, Transition::Begin);

        match self.create_wallet(password, seed).await {
            Ok(key) => {
                machine.session = Some(key);
                self.inner.publish(&mut machine, Transition::Initialized);
                self.arm_auto_lock(&mut machine);
                log::info!("wallet initialized and unlocked");
                Ok(())
            }
            Err(err) => self.fail(&mut machine, err),
        }
    }

    async fn create_wallet(&self, password: &str, seed: &str) -> WalletResult<SessionKey> {
        let records = self.inner.records();
        match records.inspect().await? {
            RecordSet::Empty => {}
            RecordSet::Complete(_) => return Err(WalletError::AlreadyInitialized),
            RecordSet::Partial { present, missing } => {
                return Err(WalletError::PartialInitialization { present, missing });
            }
        }

        let password_salt = generate_salt();
        let mut seed_salt = generate_salt();
        while seed_salt == password_salt {
            seed_salt = generate_salt();
        }

        let password_hash = hash_password(password, &password_salt);
        let key =
            derive_session_key(password, seed_salt, self.inner.config.kdf_iterations).await?;
        let (encrypted_seed, seed_iv) = encrypt(seed.as_bytes(), &key)?;

        records
            .persist(&StoredCredentials {
                password_hash,
                password_salt,
                encrypted_seed,
                seed_iv,
                seed_salt,
            })
            .await?;
        Ok(key)
    }

    /// Verifies `password` and unlocks the wallet.
    ///
    /// Returns `false` on failure; read [`WalletState::error`] for the reason.
    /// A failed unlock never changes the phase.
    pub async fn unlock(&self, password: &str) -> bool {
        self.try_unlock(password).await.is_ok()
    }

    /// Like [`unlock`](Self::unlock), returning the typed error.
    ///
    /// # Errors
    ///
    /// - [`WalletError::WalletNotInitialized`] if no wallet exists
    /// - [`WalletError::InvalidPassword`] if the password does not verify
    /// - [`WalletError::PartialInitialization`] if records are missing
    pub async fn try_unlock(&self, password: &str) -> WalletResult<()> {
        let mut machine = self.inner.machine.lock().await;
        self.inner.publish(&mut machine, Transition::Begin);

        match self.verify_and_derive(password).await {
            Ok(key) => {
                machine.session = Some(key);
                self.inner.publish(&mut machine, Transition::Unlocked);
                self.arm_auto_lock(&mut machine);
                log::info!("wallet unlocked");
                Ok(())
            }
            Err(err) => self.fail(&mut machine, err),
        }
    }

    async fn verify_and_derive(&self, password: &str) -> WalletResult<SessionKey> {
        let records = self.inner.records();
        // Absent password material means there is no wallet, whatever else
        // might be lying around.
        if !records.has_password_hash().await?
            || records.get(RecordKey::PasswordSalt).await?.is_none()
        {
            return Err(WalletError::WalletNotInitialized);
        }
        let credentials = records.inspect().await?.into_complete()?;

        let candidate = hash_password(password, &credentials.password_salt);
        if candidate != credentials.password_hash {
            log::debug!("password verification failed");
            return Err(WalletError::InvalidPassword);
        }

        derive_session_key(password, credentials.seed_salt, self.inner.config.kdf_iterations)
            .await
    }

    /// Drops the session key immediately and clears `error`.
    pub async fn lock(&self) {
        let mut machine = self.inner.machine.lock().await;
        Inner::end_session(&mut machine);
        self.inner.publish(&mut machine, Transition::Locked);
        log::info!("wallet locked");
    }

    /// Decrypts and returns the seed.
    ///
    /// # Errors
    ///
    /// - [`WalletError::WalletLocked`] unless the wallet is unlocked
    /// - [`WalletError::SeedNotFound`] if the seed records are missing
    /// - [`WalletError::DecryptionFailure`] if the ciphertext does not
    ///   authenticate under the session key (corruption or a salt mismatch)
    pub async fn get_seed_phrase(&self) -> WalletResult<SecretString> {
        let mut machine = self.inner.machine.lock().await;
        self.inner.publish(&mut machine, Transition::Begin);

        let result = match machine.session.as_ref() {
            Some(key) if !machine.state.is_locked => self.read_seed(key).await,
            _ => Err(WalletError::WalletLocked),
        };
        match result {
            Ok(seed) => {
                self.inner.publish(&mut machine, Transition::Settled);
                if self.inner.config.rearm_on_activity {
                    self.arm_auto_lock(&mut machine);
                }
                Ok(seed)
            }
            Err(err) => self.fail(&mut machine, err),
        }
    }

    async fn read_seed(&self, key: &SessionKey) -> WalletResult<SecretString> {
        let records = self.inner.records();
        let (Some(ciphertext), Some(iv)) = (
            records.get(RecordKey::EncryptedSeed).await?,
            records.get(RecordKey::SeedIv).await?,
        ) else {
            return Err(WalletError::SeedNotFound);
        };

        let ciphertext = hex::decode(&ciphertext).map_err(|err| WalletError::CorruptedRecord {
            key: RecordKey::EncryptedSeed,
            reason: err.to_string(),
        })?;
        let iv: [u8; NONCE_LEN] =
            decode_fixed(&iv).map_err(|reason| WalletError::CorruptedRecord {
                key: RecordKey::SeedIv,
                reason,
            })?;

        let plaintext = decrypt(&ciphertext, &iv, key)?;
        match String::from_utf8(plaintext.to_vec()) {
            Ok(seed) => Ok(SecretString::from(seed)),
            Err(err) => {
                err.into_bytes().zeroize();
                Err(WalletError::CorruptedRecord {
                    key: RecordKey::EncryptedSeed,
                    reason: "seed is not valid UTF-8".to_string(),
                })
            }
        }
    }

    /// Wipes the whole store namespace and returns to `Uninitialized`.
    pub async fn clear(&self) {
        let _ = self.try_clear().await;
    }

    /// Like [`clear`](Self::clear), returning the typed error.
    ///
    /// The session key is dropped even if the store cannot be cleared; the
    /// wallet is then left `Locked` with the error recorded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be cleared.
    pub async fn try_clear(&self) -> WalletResult<()> {
        let mut machine = self.inner.machine.lock().await;
        self.inner.publish(&mut machine, Transition::Begin);
        Inner::end_session(&mut machine);

        match self.inner.store.clear().await {
            Ok(()) => {
                self.inner.publish(&mut machine, Transition::Cleared);
                log::info!("wallet cleared");
                Ok(())
            }
            Err(err) => {
                self.inner.publish(&mut machine, Transition::Locked);
                self.fail(&mut machine, err.into())
            }
        }
    }

    fn arm_auto_lock(&self, machine: &mut Machine) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        machine
            .timer
            .arm(self.inner.config.auto_lock_after, move |epoch| async move {
                if let Some(inner) = inner.upgrade() {
                    inner.expire(epoch).await;
                }
            });
    }

    fn fail<T>(&self, machine: &mut Machine, err: WalletError) -> WalletResult<T> {
        self.inner.publish(machine, Transition::Failed(err.to_string()));
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::store::MemoryStore;

    const SEED: &str = "define wheel flash blanket okay hybrid";

    fn manager() -> (SessionManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = WalletConfig::default().with_kdf_iterations(1_000);
        let manager = SessionManager::new(store.clone(), config).expect("manager");
        (manager, store)
    }

    #[tokio::test]
    async fn test_cold_start_uninitialized() {
        let (manager, _) = manager();
        assert!(manager.state().is_loading);
        assert_eq!(
            manager.try_check_initialization().await.unwrap(),
            Phase::Uninitialized
        );
        let state = manager.state();
        assert!(!state.is_initialized);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_initialize_unlocks_and_arms_timer() {
        let (manager, store) = manager();
        manager.check_initialization().await;
        assert!(manager.initialize("hunter2", SEED).await);

        let state = manager.state();
        assert!(state.is_initialized);
        assert!(!state.is_locked);
        assert_eq!(state.error, None);
        assert!(manager.auto_lock_deadline().await.is_some());
        assert_eq!(store.len().unwrap(), 5);

        let seed = manager.get_seed_phrase().await.unwrap();
        assert_eq!(seed.expose_secret(), SEED);
    }

    #[tokio::test]
    async fn test_password_and_seed_salts_differ() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        let password_salt = store.get("wallet_password_salt").await.unwrap().unwrap();
        let seed_salt = store.get("wallet_seed_salt").await.unwrap().unwrap();
        assert_ne!(password_salt, seed_salt);

        let hash = store.get("wallet_password_hash").await.unwrap().unwrap();
        assert_ne!(hash, "hunter2");
        assert_eq!(hash.len(), 64);
    }

    #[tokio::test]
    async fn test_reinitialize_is_rejected() {
        let (manager, _) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        assert_eq!(
            manager.try_initialize("other", "another seed").await,
            Err(WalletError::AlreadyInitialized)
        );
        assert_eq!(manager.state().error.as_deref(), Some("Wallet already initialized"));

        // The first seed is untouched.
        let seed = manager.get_seed_phrase().await.unwrap();
        assert_eq!(seed.expose_secret(), SEED);
    }

    #[tokio::test]
    async fn test_lock_drops_session() {
        let (manager, _) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        manager.lock().await;

        assert!(manager.state().is_locked);
        assert!(manager.auto_lock_deadline().await.is_none());
        assert_eq!(
            manager.get_seed_phrase().await.unwrap_err(),
            WalletError::WalletLocked
        );
        assert!(manager.inner.machine.lock().await.session.is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_keeps_wallet_locked() {
        let (manager, _) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        manager.lock().await;

        assert!(!manager.unlock("wrong").await);
        let state = manager.state();
        assert!(state.is_locked);
        assert_eq!(state.error.as_deref(), Some("Invalid password"));
        assert_eq!(
            manager.try_unlock("Hunter2").await,
            Err(WalletError::InvalidPassword)
        );
    }

    #[tokio::test]
    async fn test_check_initialization_locks_existing_wallet() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();

        let reopened =
            SessionManager::new(store, WalletConfig::default().with_kdf_iterations(1_000))
                .unwrap();
        assert_eq!(reopened.try_check_initialization().await.unwrap(), Phase::Locked);
        assert!(reopened.state().is_initialized);

        manager.check_initialization().await;
        assert!(manager.state().is_locked);
        assert!(manager.auto_lock_deadline().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_check_drops_session() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        store.set("wallet_password_salt", "zz").await.unwrap();

        assert!(matches!(
            manager.try_check_initialization().await,
            Err(WalletError::CorruptedRecord {
                key: RecordKey::PasswordSalt,
                ..
            })
        ));
        let state = manager.state();
        assert!(state.is_locked);
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        assert!(manager.auto_lock_deadline().await.is_none());
        assert_eq!(
            manager.get_seed_phrase().await.unwrap_err(),
            WalletError::WalletLocked
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_key_derivation_leaves_runtime_responsive() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store, WalletConfig::default()).unwrap();

        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });

        manager.try_initialize("hunter2", SEED).await.unwrap();
        let after_initialize = ticks.load(Ordering::SeqCst);
        manager.lock().await;
        manager.try_unlock("hunter2").await.unwrap();
        ticker.abort();

        assert!(after_initialize > 0);
        assert!(ticks.load(Ordering::SeqCst) > after_initialize);
    }

    #[tokio::test]
    async fn test_clear_resets_to_uninitialized() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        store.set("wallet_config", "{}").await.unwrap();

        manager.clear().await;
        assert_eq!(manager.state().phase(), Phase::Uninitialized);
        assert!(store.is_empty().unwrap());
        assert_eq!(
            manager.try_unlock("hunter2").await,
            Err(WalletError::WalletNotInitialized)
        );
    }

    #[tokio::test]
    async fn test_missing_seed_records_report_seed_not_found() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();
        store.remove("wallet_encrypted_seed").await.unwrap();

        assert_eq!(
            manager.get_seed_phrase().await.unwrap_err(),
            WalletError::SeedNotFound
        );
        assert_eq!(manager.state().error.as_deref(), Some("Seed phrase not found"));
    }

    #[tokio::test]
    async fn test_tampered_seed_reports_decryption_failure() {
        let (manager, store) = manager();
        manager.try_initialize("hunter2", SEED).await.unwrap();

        let mut ciphertext = hex::decode(
            store.get("wallet_encrypted_seed").await.unwrap().unwrap(),
        )
        .unwrap();
        ciphertext[0] ^= 0x01;
        store
            .set("wallet_encrypted_seed", &hex::encode(ciphertext))
            .await
            .unwrap();

        assert!(matches!(
            manager.get_seed_phrase().await,
            Err(WalletError::DecryptionFailure(_))
        ));
        // Still unlocked: the failure is confined to this call.
        assert!(!manager.state().is_locked);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let config = WalletConfig::default().with_auto_lock_after(Duration::ZERO);
        assert!(matches!(
            SessionManager::new(store, config),
            Err(WalletError::InvalidConfig(_))
        ));
    }
}
