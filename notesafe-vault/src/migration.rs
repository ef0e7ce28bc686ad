//! Corpus migration: encrypting or decrypting every record a user owns.
//!
//! Rows are processed strictly one at a time (read, transform, write). A row
//! that fails is recorded and the scan moves on; nothing is rolled back.
//! Whether a row still needs work is decided from the row itself (the `enc:`
//! marker for notes, the `encrypted` flag for files), so re-running a scan
//! finishes whatever an earlier run left behind.

use notesafe_crypto::{
    decrypt_bytes, decrypt_string, encrypt_bytes, encrypt_string, is_encrypted, DerivedKey,
};
use notesafe_types::{FileRecord, FileRepository, Note, NoteRepository};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MigrationDirection {
    Encrypt,
    Decrypt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    Note,
    File,
}

/// Which record kinds a scan covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    Notes,
    Files,
    All,
}

impl Scope {
    pub(crate) fn notes(self) -> bool {
        matches!(self, Scope::Notes | Scope::All)
    }

    pub(crate) fn files(self) -> bool {
        matches!(self, Scope::Files | Scope::All)
    }
}

/// A row the scan could not process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationFailure {
    pub kind: RecordKind,
    pub record_id: String,
    pub error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MigrationOutcome {
    /// Every row is in the target state.
    Complete,
    /// Some rows failed; re-running the operation retries them.
    Partial,
    /// Every row that needed work failed.
    Failed,
}

/// Summary returned by every migrating operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub direction: MigrationDirection,
    /// Rows scanned.
    pub total: usize,
    /// Rows rewritten.
    pub processed: usize,
    /// Rows already in the target state.
    pub skipped: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    pub fn new(direction: MigrationDirection) -> Self {
        Self {
            direction,
            total: 0,
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn outcome(&self) -> MigrationOutcome {
        if self.failures.is_empty() {
            MigrationOutcome::Complete
        } else if self.processed == 0 {
            MigrationOutcome::Failed
        } else {
            MigrationOutcome::Partial
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, kind: RecordKind, record_id: &str, error: impl ToString) {
        let error = error.to_string();
        warn!(?kind, record_id, %error, "migration row failed");
        self.failures.push(MigrationFailure {
            kind,
            record_id: record_id.to_string(),
            error,
        });
    }
}

/// Reports integer percent-complete after each row.
pub(crate) struct Progress<'a, F: FnMut(u8)> {
    total: usize,
    done: usize,
    on_progress: &'a mut F,
}

impl<'a, F: FnMut(u8)> Progress<'a, F> {
    /// An empty scan reports 100 immediately.
    pub(crate) fn start(total: usize, on_progress: &'a mut F) -> Self {
        if total == 0 {
            on_progress(100);
        }
        Self {
            total,
            done: 0,
            on_progress,
        }
    }

    fn advance(&mut self) {
        self.done += 1;
        let percent = (self.done * 100 / self.total.max(1)).min(100);
        (self.on_progress)(percent as u8);
    }
}

/// Migrates the notes named by `note_ids`. Each note is re-read right before
/// it is transformed so edits saved during the scan are not overwritten.
pub(crate) async fn migrate_notes<F: FnMut(u8)>(
    repo: &dyn NoteRepository,
    key: &DerivedKey,
    note_ids: Vec<String>,
    direction: MigrationDirection,
    report: &mut MigrationReport,
    progress: &mut Progress<'_, F>,
) {
    report.total += note_ids.len();

    for note_id in note_ids {
        match repo.get(&note_id).await {
            Ok(Some(note)) => migrate_note(repo, key, note, direction, report).await,
            Ok(None) => report.skipped += 1,
            Err(e) => report.fail(RecordKind::Note, &note_id, e),
        }
        progress.advance();
    }

    debug!(
        ?direction,
        processed = report.processed,
        skipped = report.skipped,
        "note scan finished"
    );
}

async fn migrate_note(
    repo: &dyn NoteRepository,
    key: &DerivedKey,
    note: Note,
    direction: MigrationDirection,
    report: &mut MigrationReport,
) {
    let want_encrypted = direction == MigrationDirection::Encrypt;
    if is_encrypted(&note.content) == want_encrypted {
        report.skipped += 1;
        return;
    }

    let transformed = if want_encrypted {
        encrypt_string(key, &note.content)
    } else {
        decrypt_string(key, &note.content)
    };

    let content = match transformed {
        Ok(content) => content,
        Err(e) => return report.fail(RecordKind::Note, &note.id, e),
    };

    match repo.update_content(&note.id, &content).await {
        Ok(()) => report.processed += 1,
        Err(e) => report.fail(RecordKind::Note, &note.id, e),
    }
}

/// Migrates the files named by `file_ids`. Files are fetched one by one so
/// only a single payload is held in memory at a time.
pub(crate) async fn migrate_files<F: FnMut(u8)>(
    repo: &dyn FileRepository,
    key: &DerivedKey,
    file_ids: Vec<String>,
    direction: MigrationDirection,
    report: &mut MigrationReport,
    progress: &mut Progress<'_, F>,
) {
    report.total += file_ids.len();

    for file_id in file_ids {
        match repo.get(&file_id).await {
            Ok(Some(record)) => migrate_file(repo, key, record, direction, report).await,
            Ok(None) => report.skipped += 1,
            Err(e) => report.fail(RecordKind::File, &file_id, e),
        }
        progress.advance();
    }
}

async fn migrate_file(
    repo: &dyn FileRepository,
    key: &DerivedKey,
    record: FileRecord,
    direction: MigrationDirection,
    report: &mut MigrationReport,
) {
    let want_encrypted = direction == MigrationDirection::Encrypt;
    if record.encrypted == want_encrypted {
        report.skipped += 1;
        return;
    }

    let transformed = if want_encrypted {
        encrypt_bytes(key, &record.data)
    } else {
        decrypt_bytes(key, &record.data)
    };

    let data = match transformed {
        Ok(data) => data,
        Err(e) => return report.fail(RecordKind::File, &record.id, e),
    };

    let id = record.id.clone();
    let updated = FileRecord {
        data,
        encrypted: want_encrypted,
        ..record
    };
    match repo.update(updated).await {
        Ok(()) => report.processed += 1,
        Err(e) => report.fail(RecordKind::File, &id, e),
    }
}
