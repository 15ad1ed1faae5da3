//! File-based world book — one JSON document holding every managed entry.
//!
//! Entries are loaded into memory on creation and flushed to disk on every
//! mutation (write, delete). Flushes go through a temporary file and a
//! rename so a crash never leaves a half-written document.
//!
//! Storage location: `~/.lorekeeper/world_book.json`

use async_trait::async_trait;
use lorekeeper_core::error::StoreAdapterError;
use lorekeeper_core::store::{EntryKey, StoreAdapter, WorldEntry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

type ForeignEntries = BTreeMap<String, serde_json::Value>;

/// A world book persisted as a JSON object keyed by entry key.
///
/// Keys the engine does not manage are carried through flushes untouched.
pub struct FileWorldBook {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<EntryKey, WorldEntry>>>,
    foreign: ForeignEntries,
}

impl FileWorldBook {
    /// Open the world book at `path`.
    ///
    /// A missing file starts empty (created on first write). An unreadable
    /// document starts empty as well, with a warning.
    pub fn new(path: PathBuf) -> Self {
        let (entries, foreign) = Self::load_from_disk(&path);
        debug!(
            path = %path.display(),
            count = entries.len(),
            foreign = foreign.len(),
            "File world book loaded"
        );
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            foreign,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> (BTreeMap<EntryKey, WorldEntry>, ForeignEntries) {
        let mut entries = BTreeMap::new();
        let mut foreign = BTreeMap::new();

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return (entries, foreign),
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "World book unreadable, starting empty");
                return (entries, foreign);
            }
        };

        for (name, value) in raw {
            let Some(key) = EntryKey::from_key(&name) else {
                foreign.insert(name, value);
                continue;
            };
            match serde_json::from_value::<WorldEntry>(value) {
                Ok(entry) if entry.key == key => {
                    entries.insert(key, entry);
                }
                Ok(_) => warn!(key = %name, "Skipping world book entry filed under the wrong key"),
                Err(e) => warn!(key = %name, error = %e, "Skipping corrupted world book entry"),
            }
        }
        (entries, foreign)
    }

    /// Flush all entries to disk.
    async fn flush(&self, operation: &'static str, key: EntryKey) -> Result<(), StoreAdapterError> {
        let fail = |reason: String| StoreAdapterError { operation, key, reason, retryable: true };

        let mut document = self.foreign.clone();
        for (k, entry) in self.entries.read().await.iter() {
            let value = serde_json::to_value(entry)
                .map_err(|e| fail(format!("Failed to serialize entry {k}: {e}")))?;
            document.insert(k.as_str().to_string(), value);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| fail(format!("Failed to create world book directory: {e}")))?;
        }

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| fail(format!("Failed to serialize world book: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| fail(format!("Failed to write world book: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| fail(format!("Failed to replace world book: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for FileWorldBook {
    fn name(&self) -> &str {
        "file"
    }

    async fn read_entry(&self, key: EntryKey) -> Result<Option<WorldEntry>, StoreAdapterError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn write_entry(&self, entry: WorldEntry) -> Result<(), StoreAdapterError> {
        let key = entry.key;
        self.entries.write().await.insert(key, entry);
        self.flush("write", key).await
    }

    async fn delete_entry(&self, key: EntryKey) -> Result<(), StoreAdapterError> {
        let removed = self.entries.write().await.remove(&key).is_some();
        if removed {
            self.flush("delete", key).await?;
        }
        Ok(())
    }
}
