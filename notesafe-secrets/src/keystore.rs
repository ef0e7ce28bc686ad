//! Key/value access to platform secure storage.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;

use crate::error::{SecretStoreError, SecretStoreResult};

/// Keychain service name used by [`KeyringKeystore::default`].
pub const DEFAULT_SERVICE_NAME: &str = "notesafe";

/// Minimal string key/value store backed by secure hardware or the OS keychain.
#[async_trait]
pub trait SecureKeystore: Send + Sync {
    async fn get(&self, key: &str) -> SecretStoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> SecretStoreResult<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> SecretStoreResult<()>;
}

// ============================================================================
// KeyringKeystore: OS keychain via the `keyring` crate
// ============================================================================

/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service).
///
/// Keychain calls block, so each one runs on the blocking pool.
#[derive(Clone, Debug)]
pub struct KeyringKeystore {
    service: String,
}

impl KeyringKeystore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, key: &str) -> SecretStoreResult<Entry> {
        Entry::new(service, key)
            .map_err(|e| SecretStoreError::Keystore(format!("keychain entry failed: {e}")))
    }
}

impl Default for KeyringKeystore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

#[async_trait]
impl SecureKeystore for KeyringKeystore {
    async fn get(&self, key: &str) -> SecretStoreResult<Option<String>> {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &key)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(SecretStoreError::Keystore(format!("keychain read failed: {e}"))),
            }
        })
        .await?
    }

    async fn set(&self, key: &str, value: &str) -> SecretStoreResult<()> {
        let service = self.service.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            Self::entry(&service, &key)?
                .set_password(&value)
                .map_err(|e| SecretStoreError::Keystore(format!("keychain write failed: {e}")))
        })
        .await?
    }

    async fn remove(&self, key: &str) -> SecretStoreResult<()> {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            match Self::entry(&service, &key)?.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(SecretStoreError::Keystore(format!("keychain delete failed: {e}"))),
            }
        })
        .await?
    }
}

// ============================================================================
// MemoryKeystore: process-local, for tests and headless runs
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryKeystore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecureKeystore for MemoryKeystore {
    async fn get(&self, key: &str) -> SecretStoreResult<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| SecretStoreError::Keystore(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SecretStoreResult<()> {
        self.values
            .lock()
            .map_err(|e| SecretStoreError::Keystore(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> SecretStoreResult<()> {
        self.values
            .lock()
            .map_err(|e| SecretStoreError::Keystore(e.to_string()))?
            .remove(key);
        Ok(())
    }
}
