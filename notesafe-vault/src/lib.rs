//! Passphrase-based content encryption for a user's notes and files.
//!
//! [`EncryptionManager`] owns the single in-memory content key and moves
//! between three states:
//!
//! ```text
//!            enable(pass)                 lock()
//! Disabled ───────────────▶ Unlocked ───────────────▶ Locked
//!    ▲                        │  ▲                      │
//!    └──── disable(pass) ─────┘  └───── unlock(pass) ───┘
//! ```
//!
//! Enabling and disabling rewrite the user's existing notes (corpus
//! migration). Migration is a sequential scan, not a transaction: each row
//! is classified only by whether its content carries the `enc:` marker, so
//! an interrupted run is finished by simply running it again.
//!
//! The key is never persisted. The salt and a verification token live in
//! the remote preferences row; the key is rederived on every unlock and is
//! zeroized on lock, disable, and drop.

mod config;
mod error;
mod files;
mod key_slot;
mod manager;
mod migration;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use manager::{EncryptionManager, EncryptionState, DECRYPTION_FAILED_PLACEHOLDER};
pub use migration::{
    MigrationDirection, MigrationFailure, MigrationOutcome, MigrationReport, RecordKind,
};
