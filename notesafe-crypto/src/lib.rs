//! Content encryption layer for NoteSafe.
//!
//! Provides passphrase-based protection of note text and file bytes using:
//! - PBKDF2-HMAC-SHA256 for key derivation from a passphrase
//! - AES-256-GCM for authenticated encryption
//! - Argon2id for PIN records
//! - Zeroization of key material on drop
//!
//! # Wire formats
//!
//! Binary payloads are `IV(12) || ciphertext || tag(16)`. Protected strings
//! are the same bytes, base64-encoded and prefixed with [`ENCRYPTED_PREFIX`]:
//!
//! ```text
//! "enc:" + base64(IV || ciphertext || tag)
//! ```
//!
//! Strings without the prefix are legacy plaintext and pass through
//! [`decrypt_string`] untouched.
//!
//! # Key handling
//!
//! The [`DerivedKey`] is never persisted. It is rederived from the
//! passphrase and the stored [`Salt`] on every unlock, and is wiped from
//! memory when dropped.

mod cipher;
pub mod encryptor;
mod error;
mod key;
mod passphrase;
pub mod pin;

pub use cipher::{
    decrypt_bytes, decrypt_string, encrypt_bytes, encrypt_string, is_encrypted,
    ENCRYPTED_PREFIX, NONCE_SIZE, TAG_SIZE,
};
pub use encryptor::{ContentEncryptor, PassthroughEncryptor};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_salt, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
pub use passphrase::{validate_passphrase, MIN_PASSPHRASE_LENGTH};
pub use pin::{hash_pin, validate_pin, verify_pin, PinHashParams, PinVerification};
