//! Vault error types.

use notesafe_crypto::CryptoError;
use notesafe_types::RepositoryError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encryption is not enabled")]
    NotEnabled,

    #[error("encryption is already enabled")]
    AlreadyEnabled,

    #[error("content key is locked")]
    Locked,

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error("passphrase rejected: {0}")]
    PassphraseRejected(String),

    #[error("encryption salt missing from preferences")]
    MissingSalt,

    /// AEAD verification failed on stored content.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption(msg) => VaultError::Decryption(msg),
            CryptoError::InvalidPassphrase(msg) => VaultError::PassphraseRejected(msg),
            other => VaultError::Crypto(other),
        }
    }
}
