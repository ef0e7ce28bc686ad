//! App-level session lock for NoteSafe.
//!
//! [`SessionLock`] gates the UI with a PIN, the account password, or a
//! platform biometric prompt, and re-locks after the app has spent
//! `idle_timeout_minutes` in the background:
//!
//! ```text
//!             lock_app() / idle timeout
//! Unlocked ─────────────────────────────▶ Locked
//!    ▲                                      │
//!    └── unlock_with_pin / _password / ─────┘
//!        _biometric
//! ```
//!
//! The lock is independent of the content key held by `notesafe-vault`. PIN
//! records and the biometric flag live in the device keychain through
//! [`notesafe_secrets::SecretStore`]; the idle timeout lives in the remote
//! preferences row.

mod attempts;
mod auth;
mod clock;
mod config;
mod error;
mod monitor;
mod session;

pub use auth::{
    AccountAuthenticator, BiometricAuthenticator, BiometricKind, BiometricOutcome, NoBiometrics,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LockConfig;
pub use error::{LockError, LockResult};
pub use monitor::{spawn_lifecycle_monitor, AppLifecycleEvent};
pub use session::{LockState, SessionLock};
