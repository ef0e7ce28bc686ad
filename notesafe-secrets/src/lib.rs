//! Device-local secret storage for NoteSafe.
//!
//! Holds the app-lock PIN record and the biometric-enabled flag. Values live
//! in the platform keychain and are never synced to the backend. The
//! [`SecretStore`] gives them typed accessors over any [`SecureKeystore`].

mod error;
mod keystore;
mod store;

pub use error::{SecretStoreError, SecretStoreResult};
pub use keystore::{KeyringKeystore, MemoryKeystore, SecureKeystore, DEFAULT_SERVICE_NAME};
pub use store::{SecretStore, BIOMETRIC_ENABLED_KEY, PIN_HASH_KEY};
