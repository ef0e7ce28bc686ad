//! Crypto error types.

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Tag mismatch (wrong key or tampered data) or a malformed blob.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    #[error("invalid passphrase: {0}")]
    InvalidPassphrase(String),

    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("PIN hashing failed: {0}")]
    PinHash(String),
}
