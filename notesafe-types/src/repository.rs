//! Collaborator interfaces consumed by the protection subsystem.

use async_trait::async_trait;

use crate::error::RepositoryResult;
use crate::preferences::UserPreferences;
use crate::records::{FileRecord, Note};

/// Note storage backend.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Every note owned by `owner_id`, in a stable order.
    async fn list_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Note>>;

    async fn get(&self, note_id: &str) -> RepositoryResult<Option<Note>>;

    /// Replaces the content of an existing note.
    async fn update_content(&self, note_id: &str, content: &str) -> RepositoryResult<()>;
}

/// Attachment storage backend.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn list_ids_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<String>>;

    async fn get(&self, file_id: &str) -> RepositoryResult<Option<FileRecord>>;

    /// Inserts or replaces a file record.
    async fn update(&self, record: FileRecord) -> RepositoryResult<()>;
}

/// Remote settings record for a user.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Loads preferences, returning defaults when the user has none yet.
    async fn load(&self, user_id: &str) -> RepositoryResult<UserPreferences>;

    async fn save(&self, user_id: &str, prefs: &UserPreferences) -> RepositoryResult<()>;
}
