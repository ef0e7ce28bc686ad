//! Binary attachment protection.
//!
//! File payloads carry no in-band marker, so each [`FileRecord`] states
//! whether its bytes are encrypted. New uploads follow the user's
//! `file_encryption_enabled` preference; existing files are moved by
//! [`EncryptionManager::set_file_encryption`].

use notesafe_crypto::{decrypt_bytes, encrypt_bytes};
use notesafe_types::FileRecord;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::manager::EncryptionManager;
use crate::migration::{MigrationDirection, MigrationReport, Scope};

impl EncryptionManager {
    /// Turns file protection on or off and migrates existing files.
    ///
    /// Requires an unlocked key in both directions. When turning protection
    /// on, the preference flips first so uploads made during the scan are
    /// already protected. When turning it off, the preference flips only
    /// after every file decrypted.
    pub async fn set_file_encryption<F>(
        &self,
        enabled: bool,
        mut on_progress: F,
    ) -> VaultResult<MigrationReport>
    where
        F: FnMut(u8) + Send,
    {
        let _op = self.lifecycle.lock().await;

        let prefs = self.refresh_preferences().await?;
        if !prefs.encryption_enabled {
            return Err(VaultError::NotEnabled);
        }

        let guard = self.key.read().await;
        let key = guard.as_ref().ok_or(VaultError::Locked)?;

        if enabled {
            if !prefs.file_encryption_enabled {
                let mut prefs = prefs;
                prefs.file_encryption_enabled = true;
                self.save_preferences(prefs).await?;
                info!(user_id = %self.user_id, "file encryption enabled");
            }
            return self
                .migrate(key, MigrationDirection::Encrypt, Scope::Files, &mut on_progress)
                .await;
        }

        let report = self
            .migrate(key, MigrationDirection::Decrypt, Scope::Files, &mut on_progress)
            .await?;

        if report.is_complete() {
            let mut prefs = self.refresh_preferences().await?;
            prefs.file_encryption_enabled = false;
            self.save_preferences(prefs).await?;
            info!(user_id = %self.user_id, "file encryption disabled");
        } else {
            warn!(
                user_id = %self.user_id,
                failed = report.failures.len(),
                "some files are still encrypted; file encryption stays on"
            );
        }
        Ok(report)
    }

    /// Stores an attachment, encrypting it when file protection is on.
    ///
    /// Fails with [`VaultError::Locked`] rather than write plaintext while
    /// protection is on and no key is held. Writes plaintext while `disable`
    /// is running.
    pub async fn store_file(&self, file_id: &str, data: &[u8]) -> VaultResult<()> {
        let protect = self.prefs.read().await.file_encryption_enabled && !self.is_disabling();

        let record = if protect {
            let guard = self.key.read().await;
            let key = guard.as_ref().ok_or(VaultError::Locked)?;
            FileRecord {
                id: file_id.to_string(),
                owner_id: self.user_id.clone(),
                data: encrypt_bytes(key, data)?,
                encrypted: true,
            }
        } else {
            FileRecord::plain(file_id, self.user_id.clone(), data.to_vec())
        };

        debug!(file_id, encrypted = record.encrypted, "storing file");
        self.files.update(record).await?;
        Ok(())
    }

    /// Loads an attachment's plaintext bytes.
    ///
    /// A tampered or wrong-key payload is [`VaultError::Decryption`].
    pub async fn load_file(&self, file_id: &str) -> VaultResult<Vec<u8>> {
        let record = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| VaultError::FileNotFound(file_id.to_string()))?;

        if !record.encrypted {
            return Ok(record.data);
        }

        let guard = self.key.read().await;
        let key = guard.as_ref().ok_or(VaultError::Locked)?;
        Ok(decrypt_bytes(key, &record.data)?)
    }
}
