//! Typed accessors for the app-lock secrets.

use std::sync::Arc;

use tracing::debug;

use crate::error::SecretStoreResult;
use crate::keystore::SecureKeystore;

/// Keystore key holding the PIN record.
pub const PIN_HASH_KEY: &str = "pin_hash";

/// Keystore key holding the biometric-enabled flag.
pub const BIOMETRIC_ENABLED_KEY: &str = "biometric_enabled";

/// App-lock secrets. Independent of the content encryption key and of
/// whether content encryption is enabled.
#[derive(Clone)]
pub struct SecretStore {
    keystore: Arc<dyn SecureKeystore>,
}

impl SecretStore {
    pub fn new(keystore: Arc<dyn SecureKeystore>) -> Self {
        Self { keystore }
    }

    /// The stored PIN record, if a PIN is set.
    pub async fn pin_record(&self) -> SecretStoreResult<Option<String>> {
        self.keystore.get(PIN_HASH_KEY).await
    }

    pub async fn set_pin_record(&self, record: &str) -> SecretStoreResult<()> {
        debug!("storing PIN record");
        self.keystore.set(PIN_HASH_KEY, record).await
    }

    pub async fn remove_pin_record(&self) -> SecretStoreResult<()> {
        debug!("removing PIN record");
        self.keystore.remove(PIN_HASH_KEY).await
    }

    pub async fn has_pin(&self) -> SecretStoreResult<bool> {
        Ok(self.pin_record().await?.is_some())
    }

    pub async fn biometric_enabled(&self) -> SecretStoreResult<bool> {
        Ok(self
            .keystore
            .get(BIOMETRIC_ENABLED_KEY)
            .await?
            .is_some_and(|v| v == "true"))
    }

    /// Disabling removes the entry rather than storing `"false"`.
    pub async fn set_biometric_enabled(&self, enabled: bool) -> SecretStoreResult<()> {
        debug!(enabled, "updating biometric flag");
        if enabled {
            self.keystore.set(BIOMETRIC_ENABLED_KEY, "true").await
        } else {
            self.keystore.remove(BIOMETRIC_ENABLED_KEY).await
        }
    }
}
