//! Shared types for NoteSafe content protection.
//!
//! The protection subsystem never owns note or file storage. It talks to the
//! rest of the client through the narrow repository traits defined here:
//!
//! - [`NoteRepository`]: the user's notes (text content)
//! - [`FileRepository`]: binary attachments
//! - [`PreferencesStore`]: the remote per-user settings record
//!
//! With the `test-support` feature, the `memory` module provides in-process
//! implementations for tests.

mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod preferences;
mod records;
mod repository;

pub use error::{RepositoryError, RepositoryResult};
pub use preferences::UserPreferences;
pub use records::{FileRecord, Note};
pub use repository::{FileRepository, NoteRepository, PreferencesStore};
