//! AES-256-GCM content cipher.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;

/// Marker that distinguishes protected strings from legacy plaintext.
pub const ENCRYPTED_PREFIX: &str = "enc:";

/// AES-GCM IV length in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts `plaintext`, returning `IV || ciphertext || tag`.
///
/// A fresh random IV is drawn for every call.
pub fn encrypt_bytes(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts an `IV || ciphertext || tag` blob.
pub fn decrypt_bytes(key: &DerivedKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "blob too short: {} bytes",
            data.len()
        )));
    }

    let (iv, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })
}

/// Encrypts a string into its `enc:`-prefixed base64 form.
pub fn encrypt_string(key: &DerivedKey, plaintext: &str) -> CryptoResult<String> {
    let blob = encrypt_bytes(key, plaintext.as_bytes())?;
    Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(blob)))
}

/// Decrypts a protected string. Values without the prefix are returned as-is.
pub fn decrypt_string(key: &DerivedKey, value: &str) -> CryptoResult<String> {
    let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(value.to_string());
    };

    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
    let plaintext = decrypt_bytes(key, &blob)?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
}

/// Whether `value` carries the protected-string marker.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}
