//! Wiring from configuration to a running sync controller.

use std::sync::Arc;

use lorekeeper_compaction::{ControllerOptions, SyncController};
use lorekeeper_config::AppConfig;
use lorekeeper_core::store::StoreAdapter;
use lorekeeper_memory::{FileWorldBook, InMemoryWorldBook, RecordStore, TextExtractor};
use lorekeeper_providers::build_from_config;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the controller described by `config`.
pub async fn open(config: &AppConfig) -> Result<SyncController, Box<dyn std::error::Error>> {
    let extractor = TextExtractor::new(
        config.extraction.strip_tags.as_slice(),
        config.extraction.main_tag.as_deref(),
    )
    .map_err(|e| format!("Invalid extraction tag: {e}"))?;
    let records = RecordStore::open(config.journal_path(), extractor)?;

    let store: Arc<dyn StoreAdapter> = match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryWorldBook::new()),
        _ => Arc::new(FileWorldBook::new(config.world_book_path())),
    };
    let summarizer = build_from_config(&config.summarizer);

    let controller = SyncController::open(
        records,
        summarizer,
        store,
        ControllerOptions::from_section(&config.context),
    )
    .await?;
    Ok(controller)
}

/// Load the config and open the controller in one step.
pub async fn open_default() -> Result<SyncController, Box<dyn std::error::Error>> {
    let config = load_config()?;
    open(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorekeeper_core::record::RawTurn;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.store.path = Some(dir.join("world_book.json"));
        config.records.journal = Some(dir.join("records.jsonl"));
        config.context.enabled = true;
        config
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        {
            let controller = open(&config).await.unwrap();
            for i in 0..8 {
                controller.append(RawTurn::user(format!("Scene {i}. Detail."))).await.unwrap();
            }
            controller.set_segment_count(2).await.unwrap();
        }

        let reopened = open(&config).await.unwrap();
        let stats = reopened.statistics();
        assert_eq!(stats.record_count, 8);
        assert_eq!(stats.segment_count, 2);
        assert!(stats.pending_keys.is_empty());
    }
}
