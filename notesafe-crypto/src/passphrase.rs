//! Passphrase validation.

use crate::error::{CryptoError, CryptoResult};

/// Default minimum passphrase length in characters.
pub const MIN_PASSPHRASE_LENGTH: usize = 8;

/// Checks that a passphrase is non-blank and at least `min_len` characters.
///
/// Length is counted in Unicode scalar values, not bytes.
pub fn validate_passphrase(passphrase: &str, min_len: usize) -> CryptoResult<()> {
    if passphrase.trim().is_empty() {
        return Err(CryptoError::InvalidPassphrase(
            "passphrase cannot be empty".to_string(),
        ));
    }

    let len = passphrase.chars().count();
    if len < min_len {
        return Err(CryptoError::InvalidPassphrase(format!(
            "passphrase must be at least {min_len} characters (got {len})"
        )));
    }

    Ok(())
}
