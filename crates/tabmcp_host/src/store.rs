//! Session-scoped persistence for the context map.
//!
//! The privileged runtime may be suspended and restarted at any time; the
//! snapshot lets a fresh instance start from the last-known map instead of
//! an empty one. Storage failures degrade to an empty-then-repopulated
//! state, never a crash.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::registry::ContextRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Serialized form of the context map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub contexts: Vec<ContextRecord>,
}

/// Durable session-scoped storage for [`Snapshot`]s.
pub trait SessionStore: Send + Sync {
    /// Loads the last snapshot, `None` when nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on unreadable or corrupt storage.
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// JSON file-backed store.
pub struct JsonFileStore {
    path: Utf8PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(snapshot)?)?;
        Ok(())
    }
}
