/// Key-value storage boundary
///
/// Table state lives in two scopes: a durable one for column layout and a
/// session one for query state and selection. Both are plain string key-value
/// stores keyed by table identity, so any backend can stand in for browser
/// storage.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Per-table storage keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Durable column layout and sort model
    Layout,
    /// Session filters, grouping and aggregation
    State,
    /// Session copy of the effective selection
    SelectedRows,
    /// Session filters on child entities
    ChildTableFilters,
}

impl StorageKey {
    pub fn suffix(&self) -> &'static str {
        match self {
            StorageKey::Layout => "layout",
            StorageKey::State => "state",
            StorageKey::SelectedRows => "selected-row",
            StorageKey::ChildTableFilters => "child-table-filters",
        }
    }

    pub fn for_table(&self, table_id: &str) -> String {
        format!("{}-{}", table_id, self.suffix())
    }

    pub fn all() -> &'static [StorageKey] {
        &[
            StorageKey::Layout,
            StorageKey::State,
            StorageKey::SelectedRows,
            StorageKey::ChildTableFilters,
        ]
    }
}

/// String key-value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Read and decode a JSON value. Missing keys and undecodable values both
/// read as `None`; the latter is logged.
pub fn read_json<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Option<T> {
    let text = store.get(key)?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("ignoring unreadable stored value for '{}': {}", key, err);
            None
        }
    }
}

pub fn write_json<T: Serialize>(store: &impl KeyValueStore, key: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    store.set(key, text)
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.values().clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory. Writes go through a uniquely
/// named temporary file persisted over the target, so readers only ever see
/// a complete value.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Some(text),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("could not read '{}': {}", key, err);
                None
            }
        }
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Unique temp file in the same directory so concurrent writers never share one
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(value.as_bytes())?;
        temp_file.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_keys() {
        assert_eq!(StorageKey::Layout.for_table("Task"), "Task-layout");
        assert_eq!(StorageKey::State.for_table("Task"), "Task-state");
        assert_eq!(StorageKey::SelectedRows.for_table("Task"), "Task-selected-row");
        assert_eq!(StorageKey::ChildTableFilters.for_table("Task"), "Task-child-table-filters");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a"), None);
        store.set("a", "1".to_string()).unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_json_ignores_garbage() {
        let store = MemoryStore::new();
        store.set("k", "{not json".to_string()).unwrap();
        assert_eq!(read_json::<serde_json::Value>(&store, "k"), None);
        write_json(&store, "k", &json!({"a": 1})).unwrap();
        assert_eq!(read_json::<serde_json::Value>(&store, "k"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("layouts"));
        assert_eq!(store.get("Task-layout"), None);
        store.remove("Task-layout").unwrap();

        store.set("Task-layout", "[1,2]".to_string()).unwrap();
        assert_eq!(store.get("Task-layout").as_deref(), Some("[1,2]"));
        assert!(dir.path().join("layouts").join("Task-layout.json").exists());

        // Keys with path separators stay inside the directory
        store.set("../Task/x", "1".to_string()).unwrap();
        assert_eq!(store.get("../Task/x").as_deref(), Some("1"));

        store.remove("Task-layout").unwrap();
        assert_eq!(store.get("Task-layout"), None);
    }

    #[test]
    fn test_json_file_store_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| store.set("Task-layout", format!("[{},{}]", t, i)).is_err())
                        .count()
                })
            })
            .collect();
        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(failures, 0);

        let stored: serde_json::Value = serde_json::from_str(&store.get("Task-layout").unwrap()).unwrap();
        assert_eq!(stored.as_array().map(|a| a.len()), Some(2));
        // Only the value file remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
