//! In-memory repository implementations.
//!
//! Test doubles for the collaborator traits, available to other crates'
//! tests through the `test-support` feature. Each repository can be told to
//! fail writes for specific IDs so callers can exercise partial-failure
//! paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RepositoryError, RepositoryResult};
use crate::preferences::UserPreferences;
use crate::records::{FileRecord, Note};
use crate::repository::{FileRepository, NoteRepository, PreferencesStore};

fn poisoned<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

// ============================================================================
// Notes
// ============================================================================

/// Notes keyed by ID. Iteration order is the ID order.
#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: Mutex<BTreeMap<String, Note>>,
    failing: Mutex<HashSet<String>>,
    update_count: Mutex<usize>,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let repo = Self::new();
        if let Ok(mut map) = repo.notes.lock() {
            for note in notes {
                map.insert(note.id.clone(), note);
            }
        }
        repo
    }

    pub fn insert(&self, note: Note) -> RepositoryResult<()> {
        self.notes.lock().map_err(poisoned)?.insert(note.id.clone(), note);
        Ok(())
    }

    pub fn remove(&self, note_id: &str) -> RepositoryResult<Option<Note>> {
        Ok(self.notes.lock().map_err(poisoned)?.remove(note_id))
    }

    /// Makes every subsequent update of `note_id` fail until cleared.
    pub fn fail_updates_for(&self, note_id: &str) -> RepositoryResult<()> {
        self.failing.lock().map_err(poisoned)?.insert(note_id.to_string());
        Ok(())
    }

    pub fn clear_failures(&self) -> RepositoryResult<()> {
        self.failing.lock().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Number of successful `update_content` calls so far.
    pub fn update_count(&self) -> usize {
        self.update_count.lock().map(|c| *c).unwrap_or(0)
    }

    pub fn snapshot(&self) -> RepositoryResult<Vec<Note>> {
        Ok(self.notes.lock().map_err(poisoned)?.values().cloned().collect())
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn list_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Note>> {
        let notes = self.notes.lock().map_err(poisoned)?;
        Ok(notes
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get(&self, note_id: &str) -> RepositoryResult<Option<Note>> {
        Ok(self.notes.lock().map_err(poisoned)?.get(note_id).cloned())
    }

    async fn update_content(&self, note_id: &str, content: &str) -> RepositoryResult<()> {
        if self.failing.lock().map_err(poisoned)?.contains(note_id) {
            return Err(RepositoryError::Backend(format!(
                "injected write failure for {note_id}"
            )));
        }
        let mut notes = self.notes.lock().map_err(poisoned)?;
        let note = notes
            .get_mut(note_id)
            .ok_or_else(|| RepositoryError::NotFound(note_id.to_string()))?;
        note.content = content.to_string();
        *self.update_count.lock().map_err(poisoned)? += 1;
        Ok(())
    }
}

// ============================================================================
// Files
// ============================================================================

#[derive(Default)]
pub struct InMemoryFileRepository {
    files: Mutex<BTreeMap<String, FileRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: impl IntoIterator<Item = FileRecord>) -> Self {
        let repo = Self::new();
        if let Ok(mut map) = repo.files.lock() {
            for file in files {
                map.insert(file.id.clone(), file);
            }
        }
        repo
    }

    pub fn fail_updates_for(&self, file_id: &str) -> RepositoryResult<()> {
        self.failing.lock().map_err(poisoned)?.insert(file_id.to_string());
        Ok(())
    }

    pub fn clear_failures(&self) -> RepositoryResult<()> {
        self.failing.lock().map_err(poisoned)?.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> RepositoryResult<Vec<FileRecord>> {
        Ok(self.files.lock().map_err(poisoned)?.values().cloned().collect())
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn list_ids_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<String>> {
        let files = self.files.lock().map_err(poisoned)?;
        Ok(files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .map(|f| f.id.clone())
            .collect())
    }

    async fn get(&self, file_id: &str) -> RepositoryResult<Option<FileRecord>> {
        Ok(self.files.lock().map_err(poisoned)?.get(file_id).cloned())
    }

    async fn update(&self, record: FileRecord) -> RepositoryResult<()> {
        if self.failing.lock().map_err(poisoned)?.contains(&record.id) {
            return Err(RepositoryError::Backend(format!(
                "injected write failure for {}",
                record.id
            )));
        }
        self.files
            .lock()
            .map_err(poisoned)?
            .insert(record.id.clone(), record);
        Ok(())
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Stores each user's preferences as serialized JSON, mirroring the remote row.
#[derive(Default)]
pub struct InMemoryPreferencesStore {
    rows: Mutex<HashMap<String, String>>,
    fail_saves: Mutex<bool>,
}

impl InMemoryPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) -> RepositoryResult<()> {
        *self.fail_saves.lock().map_err(poisoned)? = fail;
        Ok(())
    }

    /// Raw JSON row for a user, if one has been saved.
    pub fn raw(&self, user_id: &str) -> Option<String> {
        self.rows.lock().ok()?.get(user_id).cloned()
    }
}

#[async_trait]
impl PreferencesStore for InMemoryPreferencesStore {
    async fn load(&self, user_id: &str) -> RepositoryResult<UserPreferences> {
        let rows = self.rows.lock().map_err(poisoned)?;
        match rows.get(user_id) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(UserPreferences::default()),
        }
    }

    async fn save(&self, user_id: &str, prefs: &UserPreferences) -> RepositoryResult<()> {
        if *self.fail_saves.lock().map_err(poisoned)? {
            return Err(RepositoryError::Backend("injected preferences failure".into()));
        }
        let json = serde_json::to_string(prefs)?;
        self.rows
            .lock()
            .map_err(poisoned)?
            .insert(user_id.to_string(), json);
        Ok(())
    }
}
