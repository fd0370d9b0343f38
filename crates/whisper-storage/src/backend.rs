//! Byte-oriented key/value backends.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use whisper_types::{Result, WhisperError};

// ---------------------------------------------------------------------------
// StorageBackend
// ---------------------------------------------------------------------------

/// Minimal key/value interface the session store is built on.
pub trait StorageBackend: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes `key`. Returns `true` if it existed.
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Returns every key starting with `prefix`, in byte order.
    fn list(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-process backend. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.entries.lock().map_err(|_| WhisperError::StorageError {
            reason: "memory backend lock poisoned".into(),
        })
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries()?.remove(key).is_some())
    }

    fn list(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .entries()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SledBackend
// ---------------------------------------------------------------------------

/// Name of the sled tree holding session records.
const SESSIONS_TREE: &str = "sessions";

/// Durable backend on a sled database.
pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledBackend {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// [`WhisperError::StorageError`] if the database or its tree
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| WhisperError::StorageError {
            reason: format!("failed to open sled database: {e}"),
        })?;
        let tree = db
            .open_tree(SESSIONS_TREE)
            .map_err(|e| WhisperError::StorageError {
                reason: format!("failed to open tree '{SESSIONS_TREE}': {e}"),
            })?;
        Ok(Self { db, tree })
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| WhisperError::StorageError {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }
}

impl StorageBackend for SledBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.tree.get(key).map_err(|e| WhisperError::StorageError {
            reason: format!("sled get failed: {e}"),
        })?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree
            .insert(key, value)
            .map_err(|e| WhisperError::StorageError {
                reason: format!("sled insert failed: {e}"),
            })?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let prev = self.tree.remove(key).map_err(|e| WhisperError::StorageError {
            reason: format!("sled remove failed: {e}"),
        })?;
        Ok(prev.is_some())
    }

    fn list(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, _) = item.map_err(|e| WhisperError::StorageError {
                reason: format!("sled scan_prefix failed: {e}"),
            })?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }
}
