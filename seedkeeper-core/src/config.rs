//! Tunables for the session manager.

use std::time::Duration;

use serde::Deserialize;

use crate::crypto::DEFAULT_KDF_ITERATIONS;
use crate::error::{WalletError, WalletResult};

/// Default auto-lock timeout (15 minutes).
pub const DEFAULT_AUTO_LOCK: Duration = Duration::from_secs(15 * 60);

/// Default store namespace.
pub const DEFAULT_NAMESPACE: &str = "wallet";

/// Session manager configuration.
///
/// Deserializes from JSON such as
/// `{"kdf_iterations": 100000, "auto_lock_secs": 900, "rearm_on_activity": false}`;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// PBKDF2 round count for the seed encryption key.
    pub kdf_iterations: u32,
    /// How long the wallet stays unlocked before it locks itself.
    #[serde(rename = "auto_lock_secs", with = "duration_secs")]
    pub auto_lock_after: Duration,
    /// Re-arm the auto-lock timer on every successful seed read, turning it
    /// into an inactivity timeout. Off by default: the timer only re-arms
    /// when the wallet enters the unlocked state.
    pub rearm_on_activity: bool,
    /// Name of the store namespace (the durable backend's directory).
    pub namespace: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            auto_lock_after: DEFAULT_AUTO_LOCK,
            rearm_on_activity: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl WalletConfig {
    /// Sets the PBKDF2 round count.
    #[must_use]
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Sets the auto-lock timeout.
    #[must_use]
    pub fn with_auto_lock_after(mut self, after: Duration) -> Self {
        self.auto_lock_after = after;
        self
    }

    /// Enables or disables re-arming on activity.
    #[must_use]
    pub fn with_rearm_on_activity(mut self, rearm: bool) -> Self {
        self.rearm_on_activity = rearm;
        self
    }

    /// Checks the configuration for values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidConfig`] for a zero iteration count, a
    /// zero auto-lock timeout, or a namespace that is not a plain name.
    pub fn validate(&self) -> WalletResult<()> {
        if self.kdf_iterations == 0 {
            return Err(WalletError::InvalidConfig("kdf_iterations must be non-zero".to_string()));
        }
        if self.auto_lock_after.is_zero() {
            return Err(WalletError::InvalidConfig("auto_lock_secs must be non-zero".to_string()));
        }
        if !crate::store::is_valid_key(&self.namespace) {
            return Err(WalletError::InvalidConfig(format!(
                "namespace '{}' must be a plain name",
                self.namespace
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
