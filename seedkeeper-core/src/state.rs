//! Observable wallet state and its transition function.
//!
//! [`WalletState`] is an immutable value. Every change goes through
//! [`WalletState::apply`], a pure function, so each transition can be tested
//! on its own without a session manager or a store.

use serde::Serialize;

/// Lifecycle phase derived from [`WalletState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No wallet in storage.
    Uninitialized,
    /// Wallet exists, no session key held.
    Locked,
    /// Wallet exists and a session key is held.
    Unlocked,
}

/// State published to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletState {
    /// `true` iff a complete set of credential records exists.
    pub is_initialized: bool,
    /// `true` unless a session key is held.
    pub is_locked: bool,
    /// `true` while an operation is in flight.
    pub is_loading: bool,
    /// Message of the last failed operation, cleared when the next one starts.
    pub error: Option<String>,
}

impl Default for WalletState {
    /// Cold-start state, before storage has been checked.
    fn default() -> Self {
        Self {
            is_initialized: false,
            is_locked: true,
            is_loading: true,
            error: None,
        }
    }
}

/// Events that move the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// An operation started: raise `is_loading`, clear `error`.
    Begin,
    /// Storage was inspected.
    Checked {
        /// Whether a complete wallet was found.
        initialized: bool,
    },
    /// A wallet was created and unlocked.
    Initialized,
    /// The correct password was supplied.
    Unlocked,
    /// The session key was dropped (explicitly or by the auto-lock timer).
    Locked,
    /// Storage was wiped.
    Cleared,
    /// An operation failed with the given message; the phase is unchanged.
    Failed(String),
    /// A read-only operation finished without changing the phase.
    Settled,
}

impl WalletState {
    /// Applies `transition` and returns the resulting state.
    #[must_use]
    pub fn apply(&self, transition: Transition) -> Self {
        match transition {
            Transition::Begin => Self {
                is_loading: true,
                error: None,
                ..self.clone()
            },
            Transition::Checked { initialized } => Self {
                is_initialized: initialized,
                is_locked: true,
                is_loading: false,
                error: self.error.clone(),
            },
            Transition::Initialized => Self {
                is_initialized: true,
                is_locked: false,
                is_loading: false,
                error: None,
            },
            Transition::Unlocked => Self {
                is_locked: false,
                is_loading: false,
                error: None,
                ..self.clone()
            },
            Transition::Locked => Self {
                is_locked: true,
                error: None,
                ..self.clone()
            },
            Transition::Cleared => Self {
                is_initialized: false,
                is_locked: true,
                is_loading: false,
                error: None,
            },
            Transition::Failed(message) => Self {
                is_loading: false,
                error: Some(message),
                ..self.clone()
            },
            Transition::Settled => Self {
                is_loading: false,
                ..self.clone()
            },
        }
    }

    /// The lifecycle phase this state represents.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match (self.is_initialized, self.is_locked) {
            (false, _) => Phase::Uninitialized,
            (true, true) => Phase::Locked,
            (true, false) => Phase::Unlocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlocked() -> WalletState {
        WalletState::default().apply(Transition::Initialized)
    }

    #[test]
    fn test_cold_start_is_locked_and_loading() {
        let state = WalletState::default();
        assert!(state.is_locked);
        assert!(state.is_loading);
        assert_eq!(state.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_check_on_existing_wallet_starts_locked() {
        let state = WalletState::default().apply(Transition::Checked { initialized: true });
        assert_eq!(state.phase(), Phase::Locked);
        assert!(!state.is_loading);

        // Even if a previous session was unlocked.
        let state = unlocked().apply(Transition::Checked { initialized: true });
        assert_eq!(state.phase(), Phase::Locked);
    }

    #[test]
    fn test_begin_clears_error() {
        let failed = unlocked().apply(Transition::Failed("boom".to_string()));
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.phase(), Phase::Unlocked);

        let started = failed.apply(Transition::Begin);
        assert!(started.is_loading);
        assert_eq!(started.error, None);
    }

    #[test]
    fn test_lock_unlock_cycle() {
        let locked = unlocked().apply(Transition::Locked);
        assert_eq!(locked.phase(), Phase::Locked);
        let unlocked = locked.apply(Transition::Begin).apply(Transition::Unlocked);
        assert_eq!(unlocked.phase(), Phase::Unlocked);
        assert!(!unlocked.is_loading);
    }

    #[test]
    fn test_failed_unlock_stays_locked() {
        let state = unlocked()
            .apply(Transition::Locked)
            .apply(Transition::Begin)
            .apply(Transition::Failed("Invalid password".to_string()));
        assert_eq!(state.phase(), Phase::Locked);
        assert_eq!(state.error.as_deref(), Some("Invalid password"));
    }

    #[test]
    fn test_cleared_resets_everything() {
        let state = unlocked()
            .apply(Transition::Failed("x".to_string()))
            .apply(Transition::Cleared);
        assert_eq!(
            state,
            WalletState {
                is_initialized: false,
                is_locked: true,
                is_loading: false,
                error: None,
            }
        );
    }

    #[test]
    fn test_state_serializes_for_ui() {
        let json = serde_json::to_value(unlocked()).unwrap();
        assert_eq!(json["is_initialized"], true);
        assert_eq!(json["is_locked"], false);
        assert!(json["error"].is_null());
    }
}
