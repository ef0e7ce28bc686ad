use notesafe_crypto::PinHashParams;
use serde::{Deserialize, Serialize};

/// Session lock configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Consecutive wrong PINs before unlock attempts are refused.
    pub max_pin_attempts: u32,
    /// First lockout length; doubles on each further failure.
    pub lockout_base_secs: u64,
    pub lockout_max_secs: u64,
    /// Start `Locked` on cold launch when a PIN or biometric unlock is set up.
    pub start_locked_when_protected: bool,
    pub pin: PinHashParams,
    /// Idle timeout used when the preferences row cannot be read at launch.
    pub default_idle_timeout_minutes: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_pin_attempts: 5,
            lockout_base_secs: 30,
            lockout_max_secs: 3600,
            start_locked_when_protected: true,
            pin: PinHashParams::default(),
            default_idle_timeout_minutes: 0,
        }
    }
}
