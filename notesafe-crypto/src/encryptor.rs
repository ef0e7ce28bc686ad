//! Capability interface for content encryption.
//!
//! Editors and file views depend on `Arc<dyn ContentEncryptor>` and never
//! see keys or lock state. The vault's encryption manager implements this
//! trait; `PassthroughEncryptor` stands in when protection is not wired up.

use async_trait::async_trait;

use crate::error::CryptoResult;

#[async_trait]
pub trait ContentEncryptor: Send + Sync {
    /// Protects note text for storage. Identity when no key is available.
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Reverses `encrypt`. Legacy plaintext and locked state pass through.
    async fn decrypt(&self, value: &str) -> CryptoResult<String>;

    /// Whether a content key is currently held.
    async fn is_unlocked(&self) -> bool;
}

/// No-op encryptor. Content passes through unchanged.
pub struct PassthroughEncryptor;

#[async_trait]
impl ContentEncryptor for PassthroughEncryptor {
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        Ok(plaintext.to_string())
    }

    async fn decrypt(&self, value: &str) -> CryptoResult<String> {
        Ok(value.to_string())
    }

    async fn is_unlocked(&self) -> bool {
        false
    }
}
