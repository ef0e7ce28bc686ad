//! The single in-memory slot for the content key.

use notesafe_crypto::DerivedKey;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Holds zero or one live [`DerivedKey`].
///
/// Installing a key drops the previous one and clearing drops the current
/// one; `DerivedKey` zeroizes itself on drop. Readers borrow the key through
/// a guard, so no copies of the key material are made.
#[derive(Default)]
pub(crate) struct KeySlot {
    key: RwLock<Option<DerivedKey>>,
}

impl KeySlot {
    pub(crate) async fn install(&self, key: DerivedKey) {
        *self.key.write().await = Some(key);
    }

    /// Drops the held key. Returns whether one was present.
    pub(crate) async fn clear(&self) -> bool {
        self.key.write().await.take().is_some()
    }

    pub(crate) async fn is_loaded(&self) -> bool {
        self.key.read().await.is_some()
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Option<DerivedKey>> {
        self.key.read().await
    }
}
