//! PIN records for the app lock.
//!
//! New records are Argon2id PHC strings with a random salt. Records written
//! by older clients are an unsalted SHA-256 hex digest of the PIN; those
//! still verify, and the caller is told to rewrite them.

use aes_gcm::aead::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};

const MIN_PIN_DIGITS: usize = 4;
const MAX_PIN_DIGITS: usize = 6;

/// Argon2id cost for PIN records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinHashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PinHashParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PinHashParams {
    fn argon2(&self) -> CryptoResult<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| CryptoError::PinHash(format!("invalid Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn matches(&self, params: &Params) -> bool {
        params.m_cost() == self.memory_kib
            && params.t_cost() == self.iterations
            && params.p_cost() == self.parallelism
    }
}

/// Outcome of checking a PIN against a stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinVerification {
    /// The PIN matches. `needs_upgrade` is set when the record is legacy or
    /// was hashed with different cost parameters.
    Match { needs_upgrade: bool },
    Mismatch,
}

impl PinVerification {
    pub fn is_match(&self) -> bool {
        matches!(self, PinVerification::Match { .. })
    }
}

/// PINs are 4 to 6 ASCII digits.
pub fn validate_pin(pin: &str) -> CryptoResult<()> {
    if !(MIN_PIN_DIGITS..=MAX_PIN_DIGITS).contains(&pin.len()) {
        return Err(CryptoError::InvalidPin(format!(
            "PIN must be {MIN_PIN_DIGITS}-{MAX_PIN_DIGITS} digits"
        )));
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::InvalidPin("PIN must contain only digits".to_string()));
    }
    Ok(())
}

/// Hashes a PIN into an Argon2id PHC string.
pub fn hash_pin(pin: &str, params: &PinHashParams) -> CryptoResult<String> {
    validate_pin(pin)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .argon2()?
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| CryptoError::PinHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Checks `pin` against a stored record.
///
/// A malformed PIN is simply a mismatch; only an unreadable record is an error.
pub fn verify_pin(pin: &str, record: &str, params: &PinHashParams) -> CryptoResult<PinVerification> {
    if validate_pin(pin).is_err() {
        return Ok(PinVerification::Mismatch);
    }

    if is_legacy_record(record) {
        let digest = hex::encode(Sha256::digest(pin.as_bytes()));
        let stored = record.to_ascii_lowercase();
        return Ok(if bool::from(digest.as_bytes().ct_eq(stored.as_bytes())) {
            PinVerification::Match { needs_upgrade: true }
        } else {
            PinVerification::Mismatch
        });
    }

    let parsed = PasswordHash::new(record)
        .map_err(|e| CryptoError::PinHash(format!("unreadable PIN record: {e}")))?;

    match Argon2::default().verify_password(pin.as_bytes(), &parsed) {
        Ok(()) => {
            let needs_upgrade = Params::try_from(&parsed)
                .map(|stored| !params.matches(&stored))
                .unwrap_or(true);
            Ok(PinVerification::Match { needs_upgrade })
        }
        Err(argon2::password_hash::Error::Password) => Ok(PinVerification::Mismatch),
        Err(e) => Err(CryptoError::PinHash(e.to_string())),
    }
}

fn is_legacy_record(record: &str) -> bool {
    record.len() == 64 && record.bytes().all(|b| b.is_ascii_hexdigit())
}
