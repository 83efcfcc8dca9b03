//! Small persistent key-value stores for locally generated secrets
//!
//! The credential deriver only needs a single string slot, but the store is
//! keyed so the host can share one file between several settings.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Persistent string key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key has never been written
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value durably before returning
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store file {path} is not a JSON object")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Key-value store backed by a JSON object on disk
///
/// Writes go to a sibling temp file which is then renamed over the original,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default location under the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("push-session").join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(map).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.read_map()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map)?;
        debug!(path = %self.path.display(), key, "Persisted store entry");
        Ok(())
    }
}

/// In-memory store for tests and hosts that manage persistence themselves
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("salt").unwrap(), None);
    }

    #[test]
    fn test_put_then_get_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        JsonFileStore::new(&path).put("salt", "abc").unwrap();
        let reopened = JsonFileStore::new(&path);

        assert_eq!(reopened.get("salt").unwrap(), Some("abc".to_string()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_put_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));

        store.put("theme", "dark").unwrap();
        store.put("salt", "xyz").unwrap();

        assert_eq!(store.get("theme").unwrap(), Some("dark".to_string()));
        assert_eq!(store.get("salt").unwrap(), Some("xyz".to_string()));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get("salt"), Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.write_count(), 0);
        store.put("a", "1").unwrap();
        store.put("a", "2").unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));
    }
}
