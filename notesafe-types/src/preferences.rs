//! Remote per-user preferences touched by content protection.

use serde::{Deserialize, Serialize};

/// The subset of the user's settings record owned by this subsystem.
///
/// Field names match the JSON stored on the remote settings row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub encryption_enabled: bool,

    /// Base64 of the 16-byte PBKDF2 salt. Present only while encryption is enabled.
    #[serde(default)]
    pub encryption_salt: Option<String>,

    #[serde(default)]
    pub file_encryption_enabled: bool,

    /// Minutes in the background before the app re-locks. `0` disables idle lock.
    #[serde(default)]
    pub idle_timeout_minutes: u32,

    /// `enc:` blob of a fixed token, used to check a passphrase before it is trusted.
    /// Records written before verification existed lack this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_verifier: Option<String>,
}

impl UserPreferences {
    /// Clears every encryption field, leaving unrelated settings intact.
    pub fn clear_encryption(&mut self) {
        self.encryption_enabled = false;
        self.encryption_salt = None;
        self.file_encryption_enabled = false;
        self.encryption_verifier = None;
    }
}
