//! Pluggable key-value persistence seam.
//!
//! The framework persists three kinds of records through this interface:
//! plugin enabled/disabled state, plugin-scoped configuration, and
//! per-community command-enablement overrides. Anything implementing
//! [`KvStore`] can back it; [`MemoryStore`] serves tests and ephemeral runs,
//! [`JsonFileStore`] keeps a single write-through JSON document on disk.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;

/// Durable string-keyed JSON value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Inserts or replaces the value for `key`.
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

/// Purely in-memory [`KvStore`]. State dies with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

// ─── JsonFileStore ────────────────────────────────────────────────────────────

/// File-backed [`KvStore`] holding every entry in one JSON object.
///
/// Writes are write-through: each `set`/`delete` rewrites the document. The
/// volumes involved (plugin records, enablement toggles) are tiny, so the
/// simplicity wins over an incremental format.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens (or initializes) the store at `path`.
    ///
    /// A missing file starts the store empty; a present file must parse as a
    /// JSON object.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened key-value store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn flush(&self) -> StoreResult<()> {
        let bytes = {
            let entries = self.entries.read();
            serde_json::to_vec_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        self.flush().await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", json!({"n": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"n": 1})));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        // Deleting an absent key is fine.
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.set("plugins.welcome.state", json!({"enabled": true})).await.unwrap();
        }

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            store.get("plugins.welcome.state").await.unwrap(),
            Some(json!({"enabled": true}))
        );
    }
}
