//! Note and file records as seen by the protection subsystem.

use serde::{Deserialize, Serialize};

/// A note row. `content` is either plaintext or an `enc:`-prefixed blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub content: String,
}

impl Note {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            content: content.into(),
        }
    }
}

/// A binary attachment.
///
/// Binary payloads carry no in-band marker, so the record itself states
/// whether `data` is an `IV || ciphertext || tag` blob.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub encrypted: bool,
}

impl FileRecord {
    pub fn plain(id: impl Into<String>, owner_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            data,
            encrypted: false,
        }
    }
}

impl std::fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRecord")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("len", &self.data.len())
            .field("encrypted", &self.encrypted)
            .finish()
    }
}
