use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use notesafe_crypto::{
    decrypt_string, derive_key, encrypt_string, is_encrypted, validate_passphrase, ContentEncryptor,
    CryptoResult, DerivedKey, Salt,
};
use notesafe_types::{FileRepository, NoteRepository, PreferencesStore, UserPreferences};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::key_slot::KeySlot;
use crate::migration::{
    migrate_files, migrate_notes, MigrationDirection, MigrationReport, Progress, Scope,
};

/// Shown in place of note text that fails to decrypt.
pub const DECRYPTION_FAILED_PLACEHOLDER: &str = "[decryption failed]";

/// Encrypted with the content key and stored in preferences on enable.
/// Decrypting it back proves a passphrase before any note is touched.
const VERIFICATION_PLAINTEXT: &str = "notesafe-encryption-verification-v1";

/// Encrypted notes tried when a legacy record has no verifier.
const LEGACY_PROBE_SAMPLES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EncryptionState {
    Disabled,
    /// Enabled, no key in memory.
    Locked,
    /// Enabled, key in memory.
    Unlocked,
}

enum PassphraseCheck {
    Verified,
    /// Legacy record, confirmed against an encrypted note.
    Probed,
    /// Legacy record with nothing to check against.
    Unchecked,
}

// ============================================================================
// EncryptionManager
// ============================================================================

/// Owns the content key for one user and drives the encryption lifecycle.
pub struct EncryptionManager {
    pub(crate) user_id: String,
    config: VaultConfig,
    notes: Arc<dyn NoteRepository>,
    pub(crate) files: Arc<dyn FileRepository>,
    prefs_store: Arc<dyn PreferencesStore>,
    /// Last preferences read from or written to the remote row.
    pub(crate) prefs: RwLock<UserPreferences>,
    pub(crate) key: KeySlot,
    state_tx: watch::Sender<EncryptionState>,
    /// Serializes lifecycle operations (enable, disable, unlock, lock, migrations).
    pub(crate) lifecycle: Mutex<()>,
    /// Set while `disable` decrypts the corpus. New content is written as
    /// plaintext until it finishes.
    disabling: AtomicBool,
}

impl EncryptionManager {
    /// Loads the user's preferences and starts `Disabled` or `Locked`.
    pub async fn open(
        user_id: impl Into<String>,
        config: VaultConfig,
        notes: Arc<dyn NoteRepository>,
        files: Arc<dyn FileRepository>,
        prefs_store: Arc<dyn PreferencesStore>,
    ) -> VaultResult<Self> {
        let user_id = user_id.into();
        let prefs = prefs_store.load(&user_id).await?;
        let initial = if prefs.encryption_enabled {
            EncryptionState::Locked
        } else {
            EncryptionState::Disabled
        };
        let (state_tx, _) = watch::channel(initial);

        debug!(user_id = %user_id, state = ?initial, "encryption manager opened");

        Ok(Self {
            user_id,
            config,
            notes,
            files,
            prefs_store,
            prefs: RwLock::new(prefs),
            key: KeySlot::default(),
            state_tx,
            lifecycle: Mutex::new(()),
            disabling: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> EncryptionState {
        *self.state_tx.borrow()
    }

    /// Receives every state transition.
    pub fn subscribe(&self) -> watch::Receiver<EncryptionState> {
        self.state_tx.subscribe()
    }

    pub async fn is_encryption_enabled(&self) -> bool {
        self.prefs.read().await.encryption_enabled
    }

    pub async fn is_unlocked(&self) -> bool {
        self.key.is_loaded().await
    }

    pub async fn file_encryption_enabled(&self) -> bool {
        self.prefs.read().await.file_encryption_enabled
    }

    pub async fn preferences(&self) -> UserPreferences {
        self.prefs.read().await.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Turns encryption on and encrypts every existing note.
    ///
    /// The key is installed before migration starts, so the manager is
    /// `Unlocked` even if some rows fail. Failed rows are listed in the
    /// report and picked up by [`resume_migration`](Self::resume_migration).
    pub async fn enable<F>(&self, passphrase: &str, mut on_progress: F) -> VaultResult<MigrationReport>
    where
        F: FnMut(u8) + Send,
    {
        validate_passphrase(passphrase, self.config.min_passphrase_len)?;
        let _op = self.lifecycle.lock().await;

        let mut prefs = self.prefs_store.load(&self.user_id).await?;
        if prefs.encryption_enabled {
            *self.prefs.write().await = prefs;
            self.sync_state().await;
            return Err(VaultError::AlreadyEnabled);
        }

        let salt = Salt::random();
        let key = self.derive(passphrase, salt).await?;

        prefs.encryption_enabled = true;
        prefs.encryption_salt = Some(salt.to_base64());
        prefs.encryption_verifier = Some(encrypt_string(&key, VERIFICATION_PLAINTEXT)?);
        self.save_preferences(prefs).await?;

        self.key.install(key).await;
        self.sync_state().await;
        info!(user_id = %self.user_id, "encryption enabled");

        let guard = self.key.read().await;
        let key = guard.as_ref().ok_or(VaultError::Locked)?;
        self.migrate(key, MigrationDirection::Encrypt, Scope::Notes, &mut on_progress)
            .await
    }

    /// Decrypts every note and file and turns encryption off.
    ///
    /// The passphrase is always verified first. Preferences are cleared only
    /// when every row came back to plaintext; otherwise the manager stays
    /// `Unlocked` and calling `disable` again retries the failed rows.
    pub async fn disable<F>(&self, passphrase: &str, mut on_progress: F) -> VaultResult<MigrationReport>
    where
        F: FnMut(u8) + Send,
    {
        let _op = self.lifecycle.lock().await;

        let prefs = self.refresh_preferences().await?;
        if !prefs.encryption_enabled {
            return Err(VaultError::NotEnabled);
        }

        let key = self.derive(passphrase, stored_salt(&prefs)?).await?;
        self.check_passphrase(&key, &prefs).await?;
        self.key.install(key).await;
        self.sync_state().await;

        let _disabling = DisablingGuard::set(&self.disabling);
        let report = {
            let guard = self.key.read().await;
            let key = guard.as_ref().ok_or(VaultError::Locked)?;
            self.migrate(key, MigrationDirection::Decrypt, Scope::All, &mut on_progress)
                .await?
        };

        if !report.is_complete() {
            warn!(
                user_id = %self.user_id,
                failed = report.failures.len(),
                "disable left encrypted rows behind; encryption stays enabled"
            );
            return Ok(report);
        }

        let mut prefs = self.prefs_store.load(&self.user_id).await?;
        prefs.clear_encryption();
        self.save_preferences(prefs).await?;

        self.key.clear().await;
        self.sync_state().await;
        info!(user_id = %self.user_id, "encryption disabled");

        Ok(report)
    }

    /// Rederives the key from the stored salt and holds it.
    ///
    /// With `verify_passphrase_on_unlock` set, a wrong passphrase fails here
    /// with [`VaultError::InvalidPassphrase`] and nothing changes.
    pub async fn unlock(&self, passphrase: &str) -> VaultResult<()> {
        let _op = self.lifecycle.lock().await;

        let prefs = self.refresh_preferences().await?;
        if !prefs.encryption_enabled {
            return Err(VaultError::NotEnabled);
        }

        let key = self.derive(passphrase, stored_salt(&prefs)?).await?;

        if self.config.verify_passphrase_on_unlock
            && let PassphraseCheck::Probed = self.check_passphrase(&key, &prefs).await?
        {
            self.write_back_verifier(&key).await;
        }

        self.key.install(key).await;
        self.sync_state().await;
        info!(user_id = %self.user_id, "content key unlocked");
        Ok(())
    }

    /// Drops the key. `encrypt`/`decrypt` become identity until the next unlock.
    ///
    /// Waits for a running migration to finish first.
    pub async fn lock(&self) {
        let _op = self.lifecycle.lock().await;
        if self.key.clear().await {
            info!(user_id = %self.user_id, "content key locked");
        }
        self.sync_state().await;
    }

    /// Re-runs the forward scan to finish an interrupted `enable` (and an
    /// interrupted `set_file_encryption(true)`).
    pub async fn resume_migration<F>(&self, mut on_progress: F) -> VaultResult<MigrationReport>
    where
        F: FnMut(u8) + Send,
    {
        let _op = self.lifecycle.lock().await;

        let prefs = self.prefs.read().await.clone();
        if !prefs.encryption_enabled {
            return Err(VaultError::NotEnabled);
        }

        let guard = self.key.read().await;
        let key = guard.as_ref().ok_or(VaultError::Locked)?;
        let scope = if prefs.file_encryption_enabled {
            Scope::All
        } else {
            Scope::Notes
        };
        self.migrate(key, MigrationDirection::Encrypt, scope, &mut on_progress)
            .await
    }

    /// Re-reads the remote preferences row.
    ///
    /// Drops the held key when encryption was turned off elsewhere or the
    /// salt changed under it.
    pub async fn reload_preferences(&self) -> VaultResult<EncryptionState> {
        let _op = self.lifecycle.lock().await;

        let previous_salt = self.prefs.read().await.encryption_salt.clone();
        let prefs = self.refresh_preferences().await?;

        let stale = !prefs.encryption_enabled || prefs.encryption_salt != previous_salt;
        if stale && self.key.clear().await {
            info!(user_id = %self.user_id, "encryption settings changed remotely; content key dropped");
        }

        Ok(self.sync_state().await)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Encrypts note text. Identity when no key is held or while `disable`
    /// is running.
    pub async fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        if self.is_disabling() {
            return Ok(plaintext.to_string());
        }
        match self.key.read().await.as_ref() {
            Some(key) => encrypt_string(key, plaintext),
            None => Ok(plaintext.to_string()),
        }
    }

    /// Decrypts note text. Identity when no key is held; legacy plaintext
    /// passes through unchanged.
    pub async fn decrypt(&self, value: &str) -> CryptoResult<String> {
        match self.key.read().await.as_ref() {
            Some(key) => decrypt_string(key, value),
            None => Ok(value.to_string()),
        }
    }

    /// Like [`decrypt`](Self::decrypt) but never fails.
    pub async fn decrypt_for_display(&self, value: &str) -> String {
        match self.decrypt(value).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "note failed to decrypt");
                DECRYPTION_FAILED_PLACEHOLDER.to_string()
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    pub(crate) fn is_disabling(&self) -> bool {
        self.disabling.load(Ordering::Acquire)
    }

    async fn derive(&self, passphrase: &str, salt: Salt) -> VaultResult<DerivedKey> {
        let passphrase = Zeroizing::new(passphrase.to_string());
        let params = self.config.kdf;
        let key = tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt, &params))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))??;
        Ok(key)
    }

    async fn check_passphrase(
        &self,
        key: &DerivedKey,
        prefs: &UserPreferences,
    ) -> VaultResult<PassphraseCheck> {
        if let Some(verifier) = prefs.encryption_verifier.as_deref() {
            return match decrypt_string(key, verifier) {
                Ok(token) if token == VERIFICATION_PLAINTEXT => Ok(PassphraseCheck::Verified),
                _ => Err(VaultError::InvalidPassphrase),
            };
        }

        let notes = self.notes.list_by_owner(&self.user_id).await?;
        let samples: Vec<_> = notes
            .iter()
            .filter(|n| is_encrypted(&n.content))
            .take(LEGACY_PROBE_SAMPLES)
            .collect();

        if samples.is_empty() {
            debug!(user_id = %self.user_id, "no verifier and no ciphertext; passphrase unchecked");
            return Ok(PassphraseCheck::Unchecked);
        }

        if samples.iter().any(|n| decrypt_string(key, &n.content).is_ok()) {
            Ok(PassphraseCheck::Probed)
        } else {
            Err(VaultError::InvalidPassphrase)
        }
    }

    async fn write_back_verifier(&self, key: &DerivedKey) {
        let result: VaultResult<()> = async {
            let verifier = encrypt_string(key, VERIFICATION_PLAINTEXT)?;
            let mut prefs = self.prefs_store.load(&self.user_id).await?;
            prefs.encryption_verifier = Some(verifier);
            self.save_preferences(prefs).await
        }
        .await;

        match result {
            Ok(()) => debug!(user_id = %self.user_id, "verifier added to legacy preferences"),
            Err(e) => warn!(user_id = %self.user_id, error = %e, "could not store verifier"),
        }
    }

    pub(crate) async fn migrate<F: FnMut(u8)>(
        &self,
        key: &DerivedKey,
        direction: MigrationDirection,
        scope: Scope,
        on_progress: &mut F,
    ) -> VaultResult<MigrationReport> {
        let note_ids: Vec<String> = if scope.notes() {
            self.notes
                .list_by_owner(&self.user_id)
                .await?
                .into_iter()
                .map(|n| n.id)
                .collect()
        } else {
            Vec::new()
        };
        let file_ids = if scope.files() {
            self.files.list_ids_by_owner(&self.user_id).await?
        } else {
            Vec::new()
        };

        info!(
            user_id = %self.user_id,
            ?direction,
            notes = note_ids.len(),
            files = file_ids.len(),
            "migration started"
        );

        let mut report = MigrationReport::new(direction);
        let mut progress = Progress::start(note_ids.len() + file_ids.len(), on_progress);
        migrate_notes(
            self.notes.as_ref(),
            key,
            note_ids,
            direction,
            &mut report,
            &mut progress,
        )
        .await;
        migrate_files(
            self.files.as_ref(),
            key,
            file_ids,
            direction,
            &mut report,
            &mut progress,
        )
        .await;

        info!(
            user_id = %self.user_id,
            ?direction,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failures.len(),
            "migration finished"
        );
        Ok(report)
    }

    /// Loads the remote row into the cache.
    pub(crate) async fn refresh_preferences(&self) -> VaultResult<UserPreferences> {
        let prefs = self.prefs_store.load(&self.user_id).await?;
        *self.prefs.write().await = prefs.clone();
        Ok(prefs)
    }

    /// Saves `prefs` and updates the cache. Callers load the row first so
    /// fields owned by other components survive.
    pub(crate) async fn save_preferences(&self, prefs: UserPreferences) -> VaultResult<()> {
        self.prefs_store.save(&self.user_id, &prefs).await?;
        *self.prefs.write().await = prefs;
        Ok(())
    }

    async fn sync_state(&self) -> EncryptionState {
        let state = if !self.prefs.read().await.encryption_enabled {
            EncryptionState::Disabled
        } else if self.key.is_loaded().await {
            EncryptionState::Unlocked
        } else {
            EncryptionState::Locked
        };

        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(user_id = %self.user_id, from = ?previous, to = ?state, "encryption state changed");
        }
        state
    }
}

/// Raises the `disabling` flag for the lifetime of the guard.
struct DisablingGuard<'a>(&'a AtomicBool);

impl<'a> DisablingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for DisablingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn stored_salt(prefs: &UserPreferences) -> VaultResult<Salt> {
    let encoded = prefs
        .encryption_salt
        .as_deref()
        .ok_or(VaultError::MissingSalt)?;
    Ok(Salt::from_base64(encoded)?)
}

#[async_trait]
impl ContentEncryptor for EncryptionManager {
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        EncryptionManager::encrypt(self, plaintext).await
    }

    async fn decrypt(&self, value: &str) -> CryptoResult<String> {
        EncryptionManager::decrypt(self, value).await
    }

    async fn is_unlocked(&self) -> bool {
        EncryptionManager::is_unlocked(self).await
    }
}
