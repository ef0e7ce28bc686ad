use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use notesafe_crypto::{is_encrypted, ContentEncryptor, KdfParams, ENCRYPTED_PREFIX};
use notesafe_types::memory::{InMemoryFileRepository, InMemoryNoteRepository, InMemoryPreferencesStore};
use notesafe_types::{
    FileRecord, FileRepository, Note, NoteRepository, PreferencesStore, RepositoryResult,
};
use notesafe_vault::{
    EncryptionManager, EncryptionState, MigrationDirection, MigrationOutcome, RecordKind,
    VaultConfig, VaultError, DECRYPTION_FAILED_PLACEHOLDER,
};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

const USER: &str = "user-1";
const PASS: &str = "correct horse battery staple";

fn config() -> VaultConfig {
    VaultConfig {
        kdf: KdfParams { iterations: 1_000 },
        ..VaultConfig::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    notes: Arc<InMemoryNoteRepository>,
    files: Arc<InMemoryFileRepository>,
    prefs: Arc<InMemoryPreferencesStore>,
    manager: EncryptionManager,
}

impl Harness {
    async fn new(notes: Vec<Note>, files: Vec<FileRecord>) -> Self {
        init_tracing();
        let notes = Arc::new(InMemoryNoteRepository::with_notes(notes));
        let files = Arc::new(InMemoryFileRepository::with_files(files));
        let prefs = Arc::new(InMemoryPreferencesStore::new());
        let manager = EncryptionManager::open(USER, config(), notes.clone(), files.clone(), prefs.clone())
            .await
            .unwrap();
        Self {
            notes,
            files,
            prefs,
            manager,
        }
    }

    /// Simulates an app restart against the same backend.
    async fn reopen(&self) -> EncryptionManager {
        EncryptionManager::open(
            USER,
            config(),
            self.notes.clone(),
            self.files.clone(),
            self.prefs.clone(),
        )
        .await
        .unwrap()
    }

    fn contents(&self) -> Vec<String> {
        self.notes
            .snapshot()
            .unwrap()
            .into_iter()
            .filter(|n| n.owner_id == USER)
            .map(|n| n.content)
            .collect()
    }
}

fn sample_notes() -> Vec<Note> {
    vec![
        Note::new("n1", USER, "Meeting notes"),
        Note::new("n2", USER, "Groceries: eggs, milk"),
        Note::new("n3", USER, ""),
        Note::new("n4", USER, "日本語のメモ"),
        Note::new("other", "user-2", "not mine"),
    ]
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl FnMut(u8) + Send) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |p| sink.lock().unwrap().push(p))
}

// ============================================================================
// Enable
// ============================================================================

#[tokio::test]
async fn enable_encrypts_every_note_and_reports_progress() {
    let h = Harness::new(sample_notes(), vec![]).await;
    assert_eq!(h.manager.state(), EncryptionState::Disabled);

    let (seen, on_progress) = recorder();
    let report = h.manager.enable(PASS, on_progress).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    assert_eq!(report.direction, MigrationDirection::Encrypt);
    assert_eq!(report.total, 4);
    assert_eq!(report.processed, 4);
    assert_eq!(report.outcome(), MigrationOutcome::Complete);

    assert!(h.contents().iter().all(|c| is_encrypted(c)));
    let other = h.notes.snapshot().unwrap().into_iter().find(|n| n.id == "other").unwrap();
    assert_eq!(other.content, "not mine");

    assert_eq!(h.manager.state(), EncryptionState::Unlocked);
    assert!(h.manager.is_encryption_enabled().await);
    assert!(h.manager.is_unlocked().await);
}

#[tokio::test]
async fn enable_persists_salt_and_verifier() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let prefs = h.prefs.load(USER).await.unwrap();
    assert!(prefs.encryption_enabled);
    assert!(!prefs.file_encryption_enabled);
    let salt = STANDARD.decode(prefs.encryption_salt.unwrap()).unwrap();
    assert_eq!(salt.len(), 16);
    assert!(prefs.encryption_verifier.unwrap().starts_with(ENCRYPTED_PREFIX));

    let raw = h.prefs.raw(USER).unwrap();
    assert!(!raw.contains(PASS));
}

#[tokio::test]
async fn enable_with_no_notes_reports_100_immediately() {
    let h = Harness::new(vec![], vec![]).await;
    let (seen, on_progress) = recorder();
    let report = h.manager.enable(PASS, on_progress).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![100]);
    assert_eq!(report.total, 0);
    assert_eq!(report.outcome(), MigrationOutcome::Complete);
}

#[tokio::test]
async fn enable_twice_is_rejected() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    let salt = h.prefs.load(USER).await.unwrap().encryption_salt;

    let err = h.manager.enable(PASS, |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::AlreadyEnabled));
    assert_eq!(h.prefs.load(USER).await.unwrap().encryption_salt, salt);
}

#[tokio::test]
async fn enable_rejects_weak_passphrase() {
    let h = Harness::new(sample_notes(), vec![]).await;

    let err = h.manager.enable("short", |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::PassphraseRejected(_)));
    let err = h.manager.enable("        ", |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::PassphraseRejected(_)));

    assert_eq!(h.manager.state(), EncryptionState::Disabled);
    assert!(h.prefs.raw(USER).is_none());
    assert_eq!(h.notes.update_count(), 0);
}

#[tokio::test]
async fn enable_fails_cleanly_when_preferences_cannot_be_saved() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.prefs.set_fail_saves(true).unwrap();

    let err = h.manager.enable(PASS, |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::Repository(_)));
    assert_eq!(h.manager.state(), EncryptionState::Disabled);
    assert!(!h.manager.is_unlocked().await);
    assert_eq!(h.notes.update_count(), 0);
}

// ============================================================================
// Lock / unlock
// ============================================================================

#[tokio::test]
async fn lock_makes_encrypt_and_decrypt_identity() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let ciphertext = h.manager.encrypt("secret").await.unwrap();
    assert!(is_encrypted(&ciphertext));

    h.manager.lock().await;
    assert_eq!(h.manager.state(), EncryptionState::Locked);
    assert!(!h.manager.is_unlocked().await);
    assert_eq!(h.manager.encrypt("secret").await.unwrap(), "secret");
    assert_eq!(h.manager.decrypt(&ciphertext).await.unwrap(), ciphertext);
}

#[tokio::test]
async fn unlock_checks_passphrase() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.lock().await;

    let err = h.manager.unlock("wrong passphrase").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));
    assert_eq!(h.manager.state(), EncryptionState::Locked);

    h.manager.unlock(PASS).await.unwrap();
    assert_eq!(h.manager.state(), EncryptionState::Unlocked);

    let first = h.contents().remove(0);
    assert_eq!(h.manager.decrypt(&first).await.unwrap(), "Meeting notes");
}

#[tokio::test]
async fn restart_starts_locked_and_unlocks_with_same_passphrase() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let restarted = h.reopen().await;
    assert_eq!(restarted.state(), EncryptionState::Locked);
    assert!(!restarted.is_unlocked().await);

    restarted.unlock(PASS).await.unwrap();
    let mut decrypted = Vec::new();
    for content in h.contents() {
        decrypted.push(restarted.decrypt(&content).await.unwrap());
    }
    assert_eq!(
        decrypted,
        vec!["Meeting notes", "Groceries: eggs, milk", "", "日本語のメモ"]
    );
}

#[tokio::test]
async fn unlock_requires_encryption_enabled() {
    let h = Harness::new(vec![], vec![]).await;
    let err = h.manager.unlock(PASS).await.unwrap_err();
    assert!(matches!(err, VaultError::NotEnabled));
}

#[tokio::test]
async fn unverified_unlock_defers_failure_to_first_decrypt() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let lax = EncryptionManager::open(
        USER,
        VaultConfig {
            verify_passphrase_on_unlock: false,
            ..config()
        },
        h.notes.clone(),
        h.files.clone(),
        h.prefs.clone(),
    )
    .await
    .unwrap();

    lax.unlock("wrong passphrase").await.unwrap();
    assert!(lax.is_unlocked().await);

    let first = h.contents().remove(0);
    assert!(lax.decrypt(&first).await.is_err());
    assert_eq!(lax.decrypt_for_display(&first).await, DECRYPTION_FAILED_PLACEHOLDER);
}

#[tokio::test]
async fn legacy_preferences_are_probed_and_upgraded() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let mut prefs = h.prefs.load(USER).await.unwrap();
    prefs.encryption_verifier = None;
    h.prefs.save(USER, &prefs).await.unwrap();

    let manager = h.reopen().await;
    let err = manager.unlock("wrong passphrase").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));
    assert!(h.prefs.load(USER).await.unwrap().encryption_verifier.is_none());

    manager.unlock(PASS).await.unwrap();
    assert!(h.prefs.load(USER).await.unwrap().encryption_verifier.is_some());

    manager.lock().await;
    let err = manager.unlock("another wrong one").await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));
}

#[tokio::test]
async fn legacy_preferences_without_ciphertext_accept_any_passphrase() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let mut prefs = h.prefs.load(USER).await.unwrap();
    prefs.encryption_verifier = None;
    h.prefs.save(USER, &prefs).await.unwrap();

    let manager = h.reopen().await;
    manager.unlock("anything at all").await.unwrap();
    assert_eq!(manager.state(), EncryptionState::Unlocked);
    assert!(h.prefs.load(USER).await.unwrap().encryption_verifier.is_none());
}

// ============================================================================
// Disable
// ============================================================================

#[tokio::test]
async fn disable_restores_plaintext_and_clears_preferences() {
    let h = Harness::new(sample_notes(), vec![]).await;
    let mut prefs = h.prefs.load(USER).await.unwrap();
    prefs.idle_timeout_minutes = 7;
    h.prefs.save(USER, &prefs).await.unwrap();

    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.lock().await;

    let (seen, on_progress) = recorder();
    let report = h.manager.disable(PASS, on_progress).await.unwrap();

    assert_eq!(report.direction, MigrationDirection::Decrypt);
    assert_eq!(report.processed, 4);
    assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    assert_eq!(
        h.contents(),
        vec!["Meeting notes", "Groceries: eggs, milk", "", "日本語のメモ"]
    );

    let prefs = h.prefs.load(USER).await.unwrap();
    assert!(!prefs.encryption_enabled);
    assert_eq!(prefs.encryption_salt, None);
    assert_eq!(prefs.encryption_verifier, None);
    assert_eq!(prefs.idle_timeout_minutes, 7);

    assert_eq!(h.manager.state(), EncryptionState::Disabled);
    assert!(!h.manager.is_unlocked().await);
}

#[tokio::test]
async fn disable_with_wrong_passphrase_changes_nothing() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.lock().await;
    let before = h.contents();

    let err = h.manager.disable("wrong passphrase", |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));
    assert_eq!(h.contents(), before);
    assert_eq!(h.manager.state(), EncryptionState::Locked);
    assert!(h.prefs.load(USER).await.unwrap().encryption_enabled);
}

#[tokio::test]
async fn disable_requires_encryption_enabled() {
    let h = Harness::new(vec![], vec![]).await;
    let err = h.manager.disable(PASS, |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::NotEnabled));
}

#[tokio::test]
async fn disable_with_failed_rows_stays_enabled_and_retries() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.notes.fail_updates_for("n2").unwrap();

    let report = h.manager.disable(PASS, |_| {}).await.unwrap();
    assert_eq!(report.outcome(), MigrationOutcome::Partial);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "n2");
    assert_eq!(report.failures[0].kind, RecordKind::Note);

    assert!(h.manager.is_encryption_enabled().await);
    assert_eq!(h.manager.state(), EncryptionState::Unlocked);
    assert!(h.prefs.load(USER).await.unwrap().encryption_salt.is_some());

    h.notes.clear_failures().unwrap();
    let report = h.manager.disable(PASS, |_| {}).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 3);
    assert_eq!(h.manager.state(), EncryptionState::Disabled);
    assert!(h.contents().iter().all(|c| !is_encrypted(c)));
}

// ============================================================================
// Migration resumption
// ============================================================================

#[tokio::test]
async fn failed_rows_are_reported_and_resume_finishes_them() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.notes.fail_updates_for("n3").unwrap();

    let report = h.manager.enable(PASS, |_| {}).await.unwrap();
    assert_eq!(report.outcome(), MigrationOutcome::Partial);
    assert_eq!(report.processed, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "n3");
    assert_eq!(h.manager.state(), EncryptionState::Unlocked);

    let plaintext_left: Vec<_> = h.contents().into_iter().filter(|c| !is_encrypted(c)).collect();
    assert_eq!(plaintext_left, vec![String::new()]);

    h.notes.clear_failures().unwrap();
    let report = h.manager.resume_migration(|_| {}).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 3);
    assert!(h.contents().iter().all(|c| is_encrypted(c)));
}

#[tokio::test]
async fn resume_only_touches_unprocessed_rows() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    let writes = h.notes.update_count();

    h.notes.insert(Note::new("n5", USER, "written while locked")).unwrap();
    let report = h.manager.resume_migration(|_| {}).await.unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 4);
    assert_eq!(h.notes.update_count(), writes + 1);
}

#[tokio::test]
async fn resume_requires_unlocked_key() {
    let h = Harness::new(sample_notes(), vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.lock().await;

    let err = h.manager.resume_migration(|_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::Locked));
}

// ============================================================================
// Content helpers
// ============================================================================

#[tokio::test]
async fn display_helper_masks_tampered_content() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let ciphertext = h.manager.encrypt("hello").await.unwrap();
    let mut blob = STANDARD.decode(&ciphertext[ENCRYPTED_PREFIX.len()..]).unwrap();
    blob[14] ^= 0x01;
    let tampered = format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(blob));

    assert!(h.manager.decrypt(&tampered).await.is_err());
    assert_eq!(h.manager.decrypt_for_display(&tampered).await, DECRYPTION_FAILED_PLACEHOLDER);
    assert_eq!(h.manager.decrypt_for_display(&ciphertext).await, "hello");
    assert_eq!(h.manager.decrypt_for_display("legacy text").await, "legacy text");
}

#[tokio::test]
async fn manager_serves_as_content_encryptor() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let encryptor: Arc<dyn ContentEncryptor> = Arc::new(h.manager);
    assert!(encryptor.is_unlocked().await);
    let ciphertext = encryptor.encrypt("through the trait").await.unwrap();
    assert!(is_encrypted(&ciphertext));
    assert_eq!(encryptor.decrypt(&ciphertext).await.unwrap(), "through the trait");
}

#[tokio::test]
async fn subscribers_observe_transitions() {
    let h = Harness::new(vec![], vec![]).await;
    let mut rx = h.manager.subscribe();
    assert_eq!(*rx.borrow_and_update(), EncryptionState::Disabled);

    h.manager.enable(PASS, |_| {}).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), EncryptionState::Unlocked);

    h.manager.lock().await;
    assert_eq!(*rx.borrow_and_update(), EncryptionState::Locked);

    h.manager.disable(PASS, |_| {}).await.unwrap();
    assert_eq!(*rx.borrow_and_update(), EncryptionState::Disabled);
}

#[tokio::test]
async fn reload_drops_key_when_disabled_elsewhere() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let mut prefs = h.prefs.load(USER).await.unwrap();
    prefs.clear_encryption();
    h.prefs.save(USER, &prefs).await.unwrap();

    let state = h.manager.reload_preferences().await.unwrap();
    assert_eq!(state, EncryptionState::Disabled);
    assert!(!h.manager.is_unlocked().await);
    assert_eq!(h.manager.encrypt("x").await.unwrap(), "x");
}

#[tokio::test]
async fn reload_keeps_key_when_nothing_changed() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let state = h.manager.reload_preferences().await.unwrap();
    assert_eq!(state, EncryptionState::Unlocked);
}

// ============================================================================
// Files
// ============================================================================

fn photo() -> Vec<u8> {
    (0u8..=255).cycle().take(4096).collect()
}

#[tokio::test]
async fn file_encryption_migrates_existing_and_new_files() {
    let h = Harness::new(
        vec![],
        vec![FileRecord::plain("f1", USER, photo()), FileRecord::plain("f2", USER, b"pdf".to_vec())],
    )
    .await;
    h.manager.enable(PASS, |_| {}).await.unwrap();

    let (seen, on_progress) = recorder();
    let report = h.manager.set_file_encryption(true, on_progress).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
    assert!(h.manager.file_encryption_enabled().await);
    assert!(h.prefs.load(USER).await.unwrap().file_encryption_enabled);

    let stored = h.files.get("f1").await.unwrap().unwrap();
    assert!(stored.encrypted);
    assert_eq!(stored.data.len(), 12 + 4096 + 16);
    assert_eq!(h.manager.load_file("f1").await.unwrap(), photo());

    h.manager.store_file("f3", b"new upload").await.unwrap();
    assert!(h.files.get("f3").await.unwrap().unwrap().encrypted);
    assert_eq!(h.manager.load_file("f3").await.unwrap(), b"new upload");

    let report = h.manager.set_file_encryption(false, |_| {}).await.unwrap();
    assert_eq!(report.processed, 3);
    assert!(!h.manager.file_encryption_enabled().await);
    assert!(h.files.snapshot().unwrap().iter().all(|f| !f.encrypted));
    assert_eq!(h.files.get("f1").await.unwrap().unwrap().data, photo());
}

#[tokio::test]
async fn locked_file_access_fails_instead_of_leaking() {
    let h = Harness::new(vec![], vec![FileRecord::plain("f1", USER, photo())]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.set_file_encryption(true, |_| {}).await.unwrap();
    h.manager.lock().await;

    assert!(matches!(h.manager.load_file("f1").await, Err(VaultError::Locked)));
    assert!(matches!(
        h.manager.store_file("f2", b"data").await,
        Err(VaultError::Locked)
    ));
    assert!(h.files.get("f2").await.unwrap().is_none());

    let err = h.manager.set_file_encryption(false, |_| {}).await.unwrap_err();
    assert!(matches!(err, VaultError::Locked));
}

#[tokio::test]
async fn plain_uploads_while_file_encryption_off() {
    let h = Harness::new(vec![], vec![]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.lock().await;

    h.manager.store_file("f1", b"plain").await.unwrap();
    let stored = h.files.get("f1").await.unwrap().unwrap();
    assert!(!stored.encrypted);
    assert_eq!(h.manager.load_file("f1").await.unwrap(), b"plain");
}

#[tokio::test]
async fn tampered_file_is_an_explicit_error() {
    let h = Harness::new(vec![], vec![FileRecord::plain("f1", USER, photo())]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.set_file_encryption(true, |_| {}).await.unwrap();

    let mut record = h.files.get("f1").await.unwrap().unwrap();
    let last = record.data.len() - 1;
    record.data[last] ^= 0x80;
    h.files.update(record).await.unwrap();

    assert!(matches!(h.manager.load_file("f1").await, Err(VaultError::Decryption(_))));
    assert!(matches!(h.manager.load_file("missing").await, Err(VaultError::FileNotFound(_))));
}

#[tokio::test]
async fn disable_decrypts_files_too() {
    let h = Harness::new(sample_notes(), vec![FileRecord::plain("f1", USER, photo())]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.manager.set_file_encryption(true, |_| {}).await.unwrap();

    let report = h.manager.disable(PASS, |_| {}).await.unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.outcome(), MigrationOutcome::Complete);

    let file = h.files.get("f1").await.unwrap().unwrap();
    assert!(!file.encrypted);
    assert_eq!(file.data, photo());
    assert!(!h.prefs.load(USER).await.unwrap().file_encryption_enabled);
}

#[tokio::test]
async fn file_failures_are_reported_with_kind() {
    let h = Harness::new(vec![], vec![FileRecord::plain("f1", USER, photo())]).await;
    h.manager.enable(PASS, |_| {}).await.unwrap();
    h.files.fail_updates_for("f1").unwrap();

    let report = h.manager.set_file_encryption(true, |_| {}).await.unwrap();
    assert_eq!(report.outcome(), MigrationOutcome::Failed);
    assert_eq!(report.failures[0].kind, RecordKind::File);

    h.files.clear_failures().unwrap();
    let report = h.manager.resume_migration(|_| {}).await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(h.files.get("f1").await.unwrap().unwrap().encrypted);
}

// ============================================================================
// Edits during a scan
// ============================================================================

/// Edits note `b` and deletes note `c` right after note `a` is written.
struct EditingNotes {
    inner: InMemoryNoteRepository,
    fired: AtomicBool,
}

#[async_trait]
impl NoteRepository for EditingNotes {
    async fn list_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Note>> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn get(&self, note_id: &str) -> RepositoryResult<Option<Note>> {
        self.inner.get(note_id).await
    }

    async fn update_content(&self, note_id: &str, content: &str) -> RepositoryResult<()> {
        self.inner.update_content(note_id, content).await?;
        if note_id == "a" && !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.insert(Note::new("b", USER, "edited while encrypting"))?;
            self.inner.remove("c")?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn enable_keeps_edits_saved_during_the_scan() {
    init_tracing();
    let notes = Arc::new(EditingNotes {
        inner: InMemoryNoteRepository::with_notes([
            Note::new("a", USER, "old a"),
            Note::new("b", USER, "old b"),
            Note::new("c", USER, "old c"),
        ]),
        fired: AtomicBool::new(false),
    });
    let manager = EncryptionManager::open(
        USER,
        config(),
        notes.clone(),
        Arc::new(InMemoryFileRepository::new()),
        Arc::new(InMemoryPreferencesStore::new()),
    )
    .await
    .unwrap();

    let report = manager.enable(PASS, |_| {}).await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.outcome(), MigrationOutcome::Complete);

    let b = notes.inner.get("b").await.unwrap().unwrap();
    assert!(is_encrypted(&b.content));
    assert_eq!(manager.decrypt(&b.content).await.unwrap(), "edited while encrypting");
    assert!(notes.inner.get("c").await.unwrap().is_none());
}

/// Pauses inside the first note write after `arm` until released.
struct GatedNotes {
    inner: InMemoryNoteRepository,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl GatedNotes {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NoteRepository for GatedNotes {
    async fn list_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Note>> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn get(&self, note_id: &str) -> RepositoryResult<Option<Note>> {
        self.inner.get(note_id).await
    }

    async fn update_content(&self, note_id: &str, content: &str) -> RepositoryResult<()> {
        self.inner.update_content(note_id, content).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn saves_during_disable_are_written_as_plaintext() {
    init_tracing();
    let notes = Arc::new(GatedNotes {
        inner: InMemoryNoteRepository::with_notes(sample_notes()),
        armed: AtomicBool::new(false),
        reached: Notify::new(),
        release: Notify::new(),
    });
    let files = Arc::new(InMemoryFileRepository::new());
    let manager = Arc::new(
        EncryptionManager::open(
            USER,
            config(),
            notes.clone(),
            files.clone(),
            Arc::new(InMemoryPreferencesStore::new()),
        )
        .await
        .unwrap(),
    );
    manager.enable(PASS, |_| {}).await.unwrap();
    manager.set_file_encryption(true, |_| {}).await.unwrap();
    let earlier = manager.encrypt("written before disable").await.unwrap();
    assert!(is_encrypted(&earlier));

    notes.arm();
    let disabling = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.disable(PASS, |_| {}).await })
    };
    notes.reached.notified().await;

    // n1 has already been decrypted by the scan.
    let draft = manager.encrypt("draft saved mid-disable").await.unwrap();
    assert_eq!(draft, "draft saved mid-disable");
    notes.inner.insert(Note::new("n1", USER, draft)).unwrap();

    manager.store_file("upload", b"uploaded mid-disable").await.unwrap();
    assert!(!files.get("upload").await.unwrap().unwrap().encrypted);

    assert_eq!(manager.decrypt(&earlier).await.unwrap(), "written before disable");

    notes.release.notify_one();
    let report = disabling.await.unwrap().unwrap();
    assert_eq!(report.outcome(), MigrationOutcome::Complete);
    assert_eq!(manager.state(), EncryptionState::Disabled);

    let contents: Vec<String> = notes
        .inner
        .snapshot()
        .unwrap()
        .into_iter()
        .map(|n| n.content)
        .collect();
    assert!(contents.iter().all(|c| !is_encrypted(c)));
    assert!(contents.contains(&"draft saved mid-disable".to_string()));
    assert_eq!(manager.load_file("upload").await.unwrap(), b"uploaded mid-disable");

    manager.enable(PASS, |_| {}).await.unwrap();
    assert!(is_encrypted(&manager.encrypt("after re-enable").await.unwrap()));
}
