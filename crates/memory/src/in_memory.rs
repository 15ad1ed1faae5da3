//! In-memory world book — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use lorekeeper_core::error::StoreAdapterError;
use lorekeeper_core::store::{EntryKey, StoreAdapter, WorldEntry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A world book that keeps entries in a map.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryWorldBook {
    entries: Arc<RwLock<BTreeMap<EntryKey, WorldEntry>>>,
}

impl InMemoryWorldBook {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryWorldBook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for InMemoryWorldBook {
    fn name(&self) -> &str { "memory" }

    async fn read_entry(&self, key: EntryKey) -> Result<Option<WorldEntry>, StoreAdapterError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn write_entry(&self, entry: WorldEntry) -> Result<(), StoreAdapterError> {
        self.entries.write().await.insert(entry.key, entry);
        Ok(())
    }

    async fn delete_entry(&self, key: EntryKey) -> Result<(), StoreAdapterError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry(key: EntryKey, content: &str) -> WorldEntry {
        WorldEntry::new(key, content, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn write_and_read() {
        let book = InMemoryWorldBook::new();
        book.write_entry(test_entry(EntryKey::Segment, "recent")).await.unwrap();

        let entry = book.read_entry(EntryKey::Segment).await.unwrap();
        assert_eq!(entry.unwrap().content, "recent");
        assert!(book.read_entry(EntryKey::LargeSummary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_replaces_existing() {
        let book = InMemoryWorldBook::new();
        book.write_entry(test_entry(EntryKey::Segment, "v1")).await.unwrap();
        book.write_entry(test_entry(EntryKey::Segment, "v2")).await.unwrap();
        assert_eq!(book.len().await, 1);
        assert_eq!(book.read_entry(EntryKey::Segment).await.unwrap().unwrap().content, "v2");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let book = InMemoryWorldBook::new();
        book.write_entry(test_entry(EntryKey::Settings, "{}")).await.unwrap();
        book.delete_entry(EntryKey::Settings).await.unwrap();
        book.delete_entry(EntryKey::Settings).await.unwrap();
        assert!(book.is_empty().await);
    }
}
