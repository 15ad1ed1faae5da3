//! Store adapter trait — the external world book the engine mirrors into.
//!
//! The world book is a persistent key/value knowledge store. The engine
//! manages exactly four keys: one per tier plus one for its settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreAdapterError;

/// The fixed keys managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKey {
    Segment,
    SmallSummary,
    LargeSummary,
    Settings,
}

impl EntryKey {
    /// The three tier keys, newest tier first.
    pub const TIERS: [EntryKey; 3] = [EntryKey::Segment, EntryKey::SmallSummary, EntryKey::LargeSummary];

    /// Every managed key.
    pub const ALL: [EntryKey; 4] = [
        EntryKey::Segment,
        EntryKey::SmallSummary,
        EntryKey::LargeSummary,
        EntryKey::Settings,
    ];

    /// The key string used in the world book.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKey::Segment => "lorekeeper/segment",
            EntryKey::SmallSummary => "lorekeeper/small_summary",
            EntryKey::LargeSummary => "lorekeeper/large_summary",
            EntryKey::Settings => "lorekeeper/settings",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    pub fn is_tier(&self) -> bool {
        !matches!(self, EntryKey::Settings)
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single world book entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEntry {
    pub key: EntryKey,

    /// Text injected into the model's context.
    pub content: String,

    /// Machine-readable state used to resync local state on refresh.
    #[serde(default)]
    pub payload: serde_json::Value,

    pub updated_at: DateTime<Utc>,
}

impl WorldEntry {
    pub fn new(key: EntryKey, content: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { key, content: content.into(), payload, updated_at: Utc::now() }
    }
}

/// The core StoreAdapter trait.
///
/// Implementations: in-memory (for testing), JSON file. Adapters hold no
/// authoritative state: they mirror whatever the sync controller writes.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// The adapter name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read the entry stored under `key`, if any.
    async fn read_entry(&self, key: EntryKey) -> Result<Option<WorldEntry>, StoreAdapterError>;

    /// Create or replace the entry under `entry.key`.
    async fn write_entry(&self, entry: WorldEntry) -> Result<(), StoreAdapterError>;

    /// Delete the entry under `key`. Deleting an absent key succeeds.
    async fn delete_entry(&self, key: EntryKey) -> Result<(), StoreAdapterError>;
}
