use std::collections::HashMap;
use std::sync::RwLock;

use super::{KeyValueStore, StorageKey};
use crate::error::Result;

/// In-process store that lives as long as the value
///
/// Used for tests and for embedding the core where the host already owns
/// durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    /// Returns `true` when no key is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get(StorageKey::UserId).unwrap().is_none());

        store.set(StorageKey::UserId, "a@b.c").unwrap();
        assert_eq!(
            store.get(StorageKey::UserId).unwrap().as_deref(),
            Some("a@b.c")
        );

        store.remove(StorageKey::UserId).unwrap();
        assert!(store.get(StorageKey::UserId).unwrap().is_none());
        // Removing again is fine
        store.remove(StorageKey::UserId).unwrap();
    }

    #[test]
    fn test_clear_empties_store() {
        let store = MemoryStore::new();
        store.set(StorageKey::UserGroup, "teamX").unwrap();
        store.set(StorageKey::LoginDate, "2026-01-01").unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
