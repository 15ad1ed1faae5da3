//! Published snapshots and the statistics projection derived from them.

use std::sync::Arc;

use lorekeeper_core::context::{ContextMode, ContextState, Statistics};
use lorekeeper_core::record::TextRecord;
use lorekeeper_core::store::EntryKey;

use crate::render;

/// An immutable view of the engine, replaced wholesale after each mutation.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub state: ContextState,
    pub records: Arc<Vec<TextRecord>>,
    pub record_count: usize,
    /// Keys whose external entry lags `state`.
    pub pending_keys: Vec<EntryKey>,
}

impl ContextSnapshot {
    /// Counts for the presentation layer, computed on every call.
    pub fn statistics(&self) -> Statistics {
        let tiers = &self.state.tiers;
        let segmented = self.state.mode == ContextMode::Segmented;
        let count = |len: usize| if segmented { len } else { 0 };

        Statistics {
            record_count: self.record_count,
            text_count: self.records.len(),
            segment_count: count(tiers.segment.range.len()),
            small_summary_count: count(tiers.small_summary.range.len()),
            large_summary_count: count(tiers.large_summary.range.len()),
            mode: self.state.mode,
            enabled: self.state.enabled,
            last_update_time: self.state.last_update_time,
            pending_keys: self.pending_keys.clone(),
        }
    }

    /// Prompt context for the current state.
    pub fn render_context(&self) -> String {
        render::render_context(&self.state, &self.records)
    }
}
