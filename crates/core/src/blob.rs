//! Locally-owned object references.
//!
//! Previews of selected images and downloaded results are registered in a
//! [`BlobStore`] and addressed by a `blob:` URL. Every registration is owned
//! by exactly one [`BlobHandle`]; dropping the handle releases the entry, so
//! replacing, resetting or tearing down the owner can never leak it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:storyface/";

/// Contents of a registered object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

/// Shared registry of live object references.
#[derive(Clone, Default)]
pub struct BlobStore {
    entries: Arc<Mutex<HashMap<Uuid, Blob>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` and returns the handle that owns the entry.
    pub fn create(&self, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> BlobHandle {
        let id = Uuid::new_v4();
        let blob = Blob {
            media_type: media_type.into(),
            bytes: bytes.into(),
        };
        self.lock().insert(id, blob);
        log::trace!("created {}{}", URL_PREFIX, id);

        BlobHandle {
            id,
            store: self.clone(),
        }
    }

    /// Looks up a live object by its `blob:` URL.
    pub fn get(&self, url: &str) -> Option<Blob> {
        let id = url.strip_prefix(URL_PREFIX)?;
        let id = Uuid::parse_str(id).ok()?;
        self.lock().get(&id).cloned()
    }

    /// Number of objects not yet released.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, id: &Uuid) {
        if self.lock().remove(id).is_some() {
            log::trace!("released {}{}", URL_PREFIX, id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Blob>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("live", &self.live_count())
            .finish()
    }
}

/// Owner of one registered object. Releases it on drop.
pub struct BlobHandle {
    id: Uuid,
    store: BlobStore,
}

impl BlobHandle {
    pub fn url(&self) -> String {
        format!("{}{}", URL_PREFIX, self.id)
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.store.release(&self.id);
    }
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}
