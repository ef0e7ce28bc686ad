//! The app-level lock gate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use notesafe_crypto::{hash_pin, validate_pin, verify_pin, PinVerification};
use notesafe_secrets::SecretStore;
use notesafe_types::PreferencesStore;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::attempts::PinAttemptLimiter;
use crate::auth::{AccountAuthenticator, BiometricAuthenticator, BiometricKind, BiometricOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::error::{LockError, LockResult};

/// Snapshot of the lock gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LockState {
    pub is_locked: bool,
    /// `0` disables idle lock.
    pub idle_timeout_minutes: u32,
    /// Set while the app is in the background.
    pub backgrounded_at: Option<DateTime<Utc>>,
}

/// App lock state machine. Independent of the content key: passing this
/// gate never unlocks encrypted content, and locking content never locks
/// the app.
pub struct SessionLock {
    user_id: String,
    config: LockConfig,
    secrets: SecretStore,
    preferences: Arc<dyn PreferencesStore>,
    biometrics: Arc<dyn BiometricAuthenticator>,
    account: Arc<dyn AccountAuthenticator>,
    clock: Arc<dyn Clock>,
    attempts: Mutex<PinAttemptLimiter>,
    state: watch::Sender<LockState>,
}

impl SessionLock {
    /// Builds the lock for a cold launch.
    ///
    /// Starts `Locked` when a PIN or biometric unlock is configured (and
    /// `start_locked_when_protected` is set). If the keychain cannot be read
    /// the lock fails closed. If the preferences row cannot be read the
    /// configured default idle timeout applies.
    pub async fn load(
        user_id: impl Into<String>,
        config: LockConfig,
        secrets: SecretStore,
        preferences: Arc<dyn PreferencesStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
        account: Arc<dyn AccountAuthenticator>,
    ) -> Self {
        let user_id = user_id.into();

        let idle_timeout_minutes = match preferences.load(&user_id).await {
            Ok(prefs) => prefs.idle_timeout_minutes,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "could not load idle timeout; using default");
                config.default_idle_timeout_minutes
            }
        };

        let protected = match (secrets.has_pin().await, secrets.biometric_enabled().await) {
            (Ok(pin), Ok(bio)) => pin || bio,
            (Err(e), _) | (_, Err(e)) => {
                warn!(user_id = %user_id, error = %e, "could not read keychain; starting locked");
                true
            }
        };

        let is_locked = config.start_locked_when_protected && protected;
        info!(user_id = %user_id, is_locked, idle_timeout_minutes, "session lock loaded");

        let (state, _) = watch::channel(LockState {
            is_locked,
            idle_timeout_minutes,
            backgrounded_at: None,
        });

        Self {
            user_id,
            attempts: Mutex::new(PinAttemptLimiter::new(&config)),
            config,
            secrets,
            preferences,
            biometrics,
            account,
            clock: Arc::new(SystemClock),
            state,
        }
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> LockState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state.subscribe()
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().is_locked
    }

    pub fn idle_timeout_minutes(&self) -> u32 {
        self.state.borrow().idle_timeout_minutes
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub fn lock_app(&self) {
        if self.set_locked(true) {
            info!(user_id = %self.user_id, "app locked");
        }
    }

    /// Records when the app left the foreground. A second background event
    /// without a foreground in between keeps the earlier timestamp.
    pub fn on_background(&self) {
        let now = self.clock.now();
        self.state.send_if_modified(|state| {
            if state.backgrounded_at.is_some() {
                return false;
            }
            state.backgrounded_at = Some(now);
            true
        });
        debug!(user_id = %self.user_id, "app backgrounded");
    }

    /// Applies the idle timeout. Returns whether this call locked the app.
    ///
    /// `backgrounded_at` is always cleared. A clock that moved backwards
    /// while backgrounded locks.
    pub fn on_foreground(&self) -> bool {
        let now = self.clock.now();
        let mut locked_now = false;

        self.state.send_if_modified(|state| {
            let Some(since) = state.backgrounded_at.take() else {
                return false;
            };
            if state.is_locked || state.idle_timeout_minutes == 0 {
                return true;
            }

            let elapsed = now - since;
            if elapsed < Duration::zero() {
                warn!("clock moved backwards while backgrounded; locking");
                state.is_locked = true;
            } else if elapsed >= Duration::minutes(i64::from(state.idle_timeout_minutes)) {
                state.is_locked = true;
            }
            locked_now = state.is_locked;
            true
        });

        if locked_now {
            info!(user_id = %self.user_id, "idle timeout elapsed; app locked");
        } else {
            debug!(user_id = %self.user_id, "app foregrounded");
        }
        locked_now
    }

    /// Checks `pin` against the stored record.
    ///
    /// A wrong PIN is `Ok(false)`. After `max_pin_attempts` consecutive
    /// failures, attempts are refused with [`LockError::TooManyAttempts`]
    /// until the lockout expires. Attempts are evaluated one at a time, so
    /// concurrent guesses count against the same limit. Legacy or outdated
    /// records are rewritten on success.
    pub async fn unlock_with_pin(&self, pin: &str) -> LockResult<bool> {
        let mut attempts = self.attempts.lock().await;
        attempts.check(self.clock.now())?;

        let record = self
            .secrets
            .pin_record()
            .await?
            .ok_or(LockError::PinNotSet)?;

        let pin = Zeroizing::new(pin.to_string());
        let params = self.config.pin;
        let verification = {
            let pin = pin.clone();
            tokio::task::spawn_blocking(move || verify_pin(&pin, &record, &params))
                .await
                .map_err(|e| LockError::Task(e.to_string()))??
        };

        match verification {
            PinVerification::Match { needs_upgrade } => {
                attempts.reset();
                drop(attempts);
                if needs_upgrade {
                    self.upgrade_pin_record(pin).await;
                }
                self.set_locked(false);
                info!(user_id = %self.user_id, "unlocked with PIN");
                Ok(true)
            }
            PinVerification::Mismatch => {
                match attempts.record_failure(self.clock.now()) {
                    Some(lockout_secs) => warn!(
                        user_id = %self.user_id,
                        failures = attempts.failures(),
                        lockout_secs,
                        "wrong PIN; unlock attempts suspended"
                    ),
                    None => warn!(
                        user_id = %self.user_id,
                        failures = attempts.failures(),
                        "wrong PIN"
                    ),
                }
                Ok(false)
            }
        }
    }

    /// Verifies the account password with the backend.
    pub async fn unlock_with_password(&self, password: &str) -> LockResult<bool> {
        if !self.account.reauthenticate(password).await? {
            warn!(user_id = %self.user_id, "wrong account password");
            return Ok(false);
        }
        self.attempts.lock().await.reset();
        self.set_locked(false);
        info!(user_id = %self.user_id, "unlocked with account password");
        Ok(true)
    }

    /// Runs the platform biometric prompt.
    ///
    /// Fails with [`LockError::BiometricNotEnabled`] unless the user turned
    /// biometric unlock on. Every other outcome is returned as-is.
    pub async fn unlock_with_biometric(&self, prompt: &str) -> LockResult<BiometricOutcome> {
        if !self.secrets.biometric_enabled().await? {
            return Err(LockError::BiometricNotEnabled);
        }
        if !self.biometrics.is_available().await {
            return Ok(BiometricOutcome::NotAvailable);
        }

        let outcome = self.biometrics.authenticate(prompt).await;
        if outcome.is_success() {
            self.attempts.lock().await.reset();
            self.set_locked(false);
            info!(user_id = %self.user_id, "unlocked with biometrics");
        } else {
            debug!(user_id = %self.user_id, ?outcome, "biometric unlock not completed");
        }
        Ok(outcome)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Stores a new PIN record, replacing any existing one.
    pub async fn setup_pin(&self, pin: &str) -> LockResult<()> {
        self.ensure_unlocked()?;
        validate_pin(pin)?;

        let pin = Zeroizing::new(pin.to_string());
        let record = self.hash(pin).await?;
        self.secrets.set_pin_record(&record).await?;
        self.attempts.lock().await.reset();
        info!(user_id = %self.user_id, "PIN set");
        Ok(())
    }

    pub async fn remove_pin(&self) -> LockResult<()> {
        self.ensure_unlocked()?;
        self.secrets.remove_pin_record().await?;
        self.attempts.lock().await.reset();
        info!(user_id = %self.user_id, "PIN removed");
        Ok(())
    }

    pub async fn is_pin_enabled(&self) -> LockResult<bool> {
        Ok(self.secrets.has_pin().await?)
    }

    /// Turning biometric unlock on requires hardware to be present.
    pub async fn set_biometric_enabled(&self, enabled: bool) -> LockResult<()> {
        self.ensure_unlocked()?;
        if enabled && !self.biometrics.is_available().await {
            return Err(LockError::BiometricUnavailable);
        }
        self.secrets.set_biometric_enabled(enabled).await?;
        info!(user_id = %self.user_id, enabled, "biometric unlock updated");
        Ok(())
    }

    pub async fn is_biometric_enabled(&self) -> LockResult<bool> {
        Ok(self.secrets.biometric_enabled().await?)
    }

    /// Biometric kinds the device offers. Empty without hardware.
    pub async fn biometric_kinds(&self) -> Vec<BiometricKind> {
        if self.biometrics.is_available().await {
            self.biometrics.supported_kinds().await
        } else {
            Vec::new()
        }
    }

    /// Persists the idle timeout to the preferences row. `0` disables idle lock.
    pub async fn set_idle_timeout(&self, minutes: u32) -> LockResult<()> {
        self.ensure_unlocked()?;

        let mut prefs = self.preferences.load(&self.user_id).await?;
        prefs.idle_timeout_minutes = minutes;
        self.preferences.save(&self.user_id, &prefs).await?;

        self.state.send_if_modified(|state| {
            let changed = state.idle_timeout_minutes != minutes;
            state.idle_timeout_minutes = minutes;
            changed
        });
        info!(user_id = %self.user_id, minutes, "idle timeout updated");
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_unlocked(&self) -> LockResult<()> {
        if self.is_locked() {
            Err(LockError::Locked)
        } else {
            Ok(())
        }
    }

    /// Returns whether the lock flag changed.
    fn set_locked(&self, locked: bool) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_locked == locked {
                return false;
            }
            state.is_locked = locked;
            true
        })
    }

    async fn hash(&self, pin: Zeroizing<String>) -> LockResult<String> {
        let params = self.config.pin;
        let record = tokio::task::spawn_blocking(move || hash_pin(&pin, &params))
            .await
            .map_err(|e| LockError::Task(e.to_string()))??;
        Ok(record)
    }

    async fn upgrade_pin_record(&self, pin: Zeroizing<String>) {
        let result = match self.hash(pin).await {
            Ok(record) => self.secrets.set_pin_record(&record).await.map_err(LockError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!(user_id = %self.user_id, "PIN record upgraded"),
            Err(e) => warn!(user_id = %self.user_id, error = %e, "PIN record upgrade failed"),
        }
    }
}
