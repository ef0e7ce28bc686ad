//! Session lock error types.

use notesafe_crypto::CryptoError;
use notesafe_secrets::SecretStoreError;
use notesafe_types::RepositoryError;
use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("app is locked")]
    Locked,

    #[error("no PIN is set")]
    PinNotSet,

    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("too many failed PIN attempts; retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },

    #[error("biometric authentication is not available on this device")]
    BiometricUnavailable,

    #[error("biometric unlock is not enabled")]
    BiometricNotEnabled,

    #[error("account authentication failed: {0}")]
    Account(String),

    #[error("secure storage error: {0}")]
    Secrets(#[from] SecretStoreError),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<CryptoError> for LockError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPin(msg) => LockError::InvalidPin(msg),
            other => LockError::Crypto(other),
        }
    }
}
