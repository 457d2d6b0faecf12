use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::traits::KvStore;

/// In-memory, HashMap-based key/value store.
///
/// Intended for tests and embedding. Values are held behind a `RwLock` and
/// cloned on read/write.
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        let map = self.entries.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKvStore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_read() {
        let store = InMemoryKvStore::new();
        store.write("state", b"value".to_vec()).await.unwrap();
        assert_eq!(store.read("state").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn read_missing_returns_none() {
        let store = InMemoryKvStore::new();
        assert!(store.read("missing").await.unwrap().is_none());
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn write_replaces_previous_value() {
        let store = InMemoryKvStore::new();
        store.write("k", b"one".to_vec()).await.unwrap();
        store.write("k", b"two".to_vec()).await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_present_and_missing() {
        let store = InMemoryKvStore::new();
        store.write("k", vec![1]).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn keys_are_sorted() {
        let store = InMemoryKvStore::new();
        for key in ["c", "a", "b"] {
            store.write(key, vec![]).await.unwrap();
        }
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn debug_format() {
        let debug = format!("{:?}", InMemoryKvStore::default());
        assert!(debug.contains("InMemoryKvStore"));
        assert!(debug.contains("key_count"));
    }
}
