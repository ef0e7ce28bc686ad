//! Vault configuration.

use notesafe_crypto::{KdfParams, MIN_PASSPHRASE_LENGTH};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2 parameters used for every derivation.
    pub kdf: KdfParams,

    /// Minimum passphrase length accepted by `enable`.
    pub min_passphrase_len: usize,

    /// Check the passphrase against the stored verifier on `unlock`.
    /// When off, a wrong passphrase only shows up at the first decrypt.
    pub verify_passphrase_on_unlock: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            min_passphrase_len: MIN_PASSPHRASE_LENGTH,
            verify_passphrase_on_unlock: true,
        }
    }
}
