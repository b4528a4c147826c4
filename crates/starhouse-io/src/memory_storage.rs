//! In-memory source store for testing.
//!
//! Provides a BTreeMap-based store that implements the SourceStore trait.
//! Tests pre-populate objects under `memory://...` keys to avoid file I/O.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::storage::{ObjectEntry, SourceStore};

/// Thread-safe in-memory store. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    /// Pre-populate data for a path (used by tests)
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.lock()?.insert(path.into(), bytes.into());
        Ok(())
    }

    /// Check if a path exists
    pub fn contains(&self, path: &str) -> bool {
        self.lock().map(|d| d.contains_key(path)).unwrap_or(false)
    }

    /// Get the number of stored objects
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SourceStore for MemoryStorage {
    fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let data = self.lock()?;
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectEntry {
                path: k.clone(),
                size: v.len() as u64,
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = self.lock()?;
        data.get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_insert_read() {
        let storage = MemoryStorage::new();
        storage.insert("memory://songs/a.json", "{}").unwrap();
        assert!(storage.contains("memory://songs/a.json"));
        assert_eq!(storage.read("memory://songs/a.json").unwrap(), b"{}");
        assert!(matches!(
            storage.read("memory://songs/b.json"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_storage_list_is_prefix_filtered_and_sorted() {
        let storage = MemoryStorage::new();
        storage.insert("memory://log/2.json", "22").unwrap();
        storage.insert("memory://log/1.json", "1").unwrap();
        storage.insert("memory://song/1.json", "333").unwrap();

        let files = storage.list("memory://log/").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "memory://log/1.json");
        assert_eq!(files[1].size, 2);
        assert_eq!(storage.len(), 3);
    }
}
