//! Rendering — turns local state into world book entries and prompt text.
//!
//! Each tier entry carries two things: `content`, the text injected into the
//! model's context, and `payload`, the serialized tier used to resync local
//! state on refresh.

use lorekeeper_core::context::{ContextMode, ContextSettings, ContextState};
use lorekeeper_core::record::TextRecord;
use lorekeeper_core::store::{EntryKey, WorldEntry};
use lorekeeper_core::tier::{LargeSummaryTier, SegmentTier, SeqRange, SmallSummaryTier, SummaryPiece, Tiers};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Serialized form of a tier inside a world book entry.
#[derive(Debug, Serialize, Deserialize)]
struct TierPayload<T> {
    chunk_size: usize,
    tier: T,
}

/// The entry that should exist under `key` for `state`, or `None` when the
/// entry should be absent.
pub fn desired_entry(state: &ContextState, key: EntryKey) -> Option<WorldEntry> {
    if key == EntryKey::Settings {
        return Some(settings_entry(&state.settings()));
    }
    if state.mode == ContextMode::Full {
        return None;
    }

    let tiers = &state.tiers;
    let chunk_size = tiers.chunk_size;
    match key {
        EntryKey::Segment if !tiers.segment.range.is_empty() => Some(WorldEntry::new(
            key,
            segment_text(&tiers.segment),
            payload(chunk_size, &tiers.segment),
        )),
        EntryKey::SmallSummary if !tiers.small_summary.range.is_empty() => Some(WorldEntry::new(
            key,
            small_summary_text(&tiers.small_summary),
            payload(chunk_size, &tiers.small_summary),
        )),
        EntryKey::LargeSummary if !tiers.large_summary.range.is_empty() => Some(WorldEntry::new(
            key,
            large_summary_text(&tiers.large_summary),
            payload(chunk_size, &tiers.large_summary),
        )),
        _ => None,
    }
}

pub fn settings_entry(settings: &ContextSettings) -> WorldEntry {
    let content = format!(
        "mode={} enabled={} segment_count={} small_summary_count={}",
        settings.mode, settings.enabled, settings.config.segment_count, settings.config.small_summary_count
    );
    WorldEntry::new(
        EntryKey::Settings,
        content,
        serde_json::to_value(settings).unwrap_or(serde_json::Value::Null),
    )
}

fn payload<T: Serialize>(chunk_size: usize, tier: &T) -> serde_json::Value {
    serde_json::to_value(TierPayload { chunk_size, tier }).unwrap_or(serde_json::Value::Null)
}

// ── Decoding ────────────────────────────────────────────────────────────────

/// Parse persisted settings. Returns `None` for a missing or malformed payload.
pub fn decode_settings(entry: Option<&WorldEntry>) -> Option<ContextSettings> {
    let entry = entry?;
    match serde_json::from_value(entry.payload.clone()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            debug!(error = %e, "Ignoring malformed settings entry");
            None
        }
    }
}

/// Rebuild tiers from the three tier entries.
///
/// A missing entry decodes as an empty tier anchored at the neighbouring
/// boundary. Returns `None` when a payload is malformed or the chunk sizes
/// disagree; callers still have to check coverage against the history.
pub fn decode_tiers(
    segment: Option<&WorldEntry>,
    small: Option<&WorldEntry>,
    large: Option<&WorldEntry>,
    chunk_size: usize,
) -> Option<Tiers> {
    let large: LargeSummaryTier = decode_tier(large, chunk_size)?.unwrap_or_default();

    let small: SmallSummaryTier = match decode_tier(small, chunk_size)? {
        Some(tier) => tier,
        None => SmallSummaryTier {
            range: SeqRange::empty_at(large.range.end),
            pieces: Vec::new(),
        },
    };

    let segment: SegmentTier = match decode_tier(segment, chunk_size)? {
        Some(tier) => tier,
        None => SegmentTier {
            range: SeqRange::empty_at(small.range.end),
            records: Vec::new(),
        },
    };

    Some(Tiers { chunk_size, segment, small_summary: small, large_summary: large })
}

/// `Some(None)` for a missing entry, `None` for an unusable one.
fn decode_tier<T: DeserializeOwned>(
    entry: Option<&WorldEntry>,
    chunk_size: usize,
) -> Option<Option<T>> {
    let Some(entry) = entry else {
        return Some(None);
    };
    match serde_json::from_value::<TierPayload<T>>(entry.payload.clone()) {
        Ok(p) if p.chunk_size == chunk_size => Some(Some(p.tier)),
        Ok(p) => {
            debug!(key = %entry.key, found = p.chunk_size, expected = chunk_size, "Chunk size mismatch");
            None
        }
        Err(e) => {
            debug!(key = %entry.key, error = %e, "Ignoring malformed tier entry");
            None
        }
    }
}

// ── Text ────────────────────────────────────────────────────────────────────

pub fn segment_text(tier: &SegmentTier) -> String {
    join_records(&tier.records)
}

pub fn small_summary_text(tier: &SmallSummaryTier) -> String {
    tier.pieces
        .iter()
        .map(|piece| match piece {
            SummaryPiece::Summarized { summary, .. } => summary.clone(),
            SummaryPiece::Pending { texts, .. } => texts.join("\n"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn large_summary_text(tier: &LargeSummaryTier) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(summary) = &tier.summary {
        parts.push(summary);
    }
    parts.extend(tier.pending.iter().map(String::as_str));
    parts.join("\n\n")
}

fn join_records(records: &[TextRecord]) -> String {
    records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

/// Assemble the context text handed to the model.
///
/// Segmented mode renders oldest first: large summary, small summary, then
/// the verbatim segment. Full mode renders the whole history.
pub fn render_context(state: &ContextState, records: &[TextRecord]) -> String {
    if state.mode == ContextMode::Full {
        return join_records(records);
    }

    let tiers = &state.tiers;
    let mut sections = Vec::new();
    if !tiers.large_summary.range.is_empty() {
        sections.push(format!("## Story so far\n{}", large_summary_text(&tiers.large_summary)));
    }
    if !tiers.small_summary.range.is_empty() {
        sections.push(format!("## Recent events\n{}", small_summary_text(&tiers.small_summary)));
    }
    if !tiers.segment.range.is_empty() {
        sections.push(format!("## Latest turns\n{}", segment_text(&tiers.segment)));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorekeeper_core::context::ContextConfig;

    fn state() -> ContextState {
        let mut state = ContextState::new(
            ContextSettings { mode: ContextMode::Segmented, enabled: true, config: ContextConfig::new(1, 1) },
            2,
        );
        state.tiers = Tiers {
            chunk_size: 2,
            large_summary: LargeSummaryTier {
                range: SeqRange::new(0, 1),
                summary: None,
                folded_until: 0,
                pending: vec!["a".into()],
            },
            small_summary: SmallSummaryTier {
                range: SeqRange::new(1, 2),
                pieces: vec![SummaryPiece::Summarized { range: SeqRange::new(1, 2), summary: "sum-b".into() }],
            },
            segment: SegmentTier { range: SeqRange::new(2, 3), records: vec![TextRecord::new(2, "c")] },
        };
        state
    }

    #[test]
    fn entries_round_trip_through_payload() {
        let state = state();
        let segment = desired_entry(&state, EntryKey::Segment);
        let small = desired_entry(&state, EntryKey::SmallSummary);
        let large = desired_entry(&state, EntryKey::LargeSummary);
        let decoded = decode_tiers(segment.as_ref(), small.as_ref(), large.as_ref(), 2).unwrap();
        assert_eq!(decoded, state.tiers);
        assert!(decoded.covers_exactly(3));
    }

    #[test]
    fn chunk_size_mismatch_rejected() {
        let state = state();
        let large = desired_entry(&state, EntryKey::LargeSummary);
        assert!(decode_tiers(None, None, large.as_ref(), 5).is_none());
    }

    #[test]
    fn full_mode_wants_no_tier_entries() {
        let mut state = state();
        state.mode = ContextMode::Full;
        assert!(desired_entry(&state, EntryKey::Segment).is_none());
        assert!(desired_entry(&state, EntryKey::LargeSummary).is_none());
        assert!(desired_entry(&state, EntryKey::Settings).is_some());
    }

    #[test]
    fn empty_tier_wants_no_entry() {
        let mut state = state();
        state.tiers = Tiers::empty(2);
        assert!(desired_entry(&state, EntryKey::SmallSummary).is_none());
    }

    #[test]
    fn settings_round_trip() {
        let settings = ContextSettings { mode: ContextMode::Full, enabled: true, config: ContextConfig::new(4, 9) };
        let entry = settings_entry(&settings);
        assert!(entry.content.contains("mode=full"));
        assert_eq!(decode_settings(Some(&entry)), Some(settings));
    }

    #[test]
    fn context_renders_oldest_first() {
        let text = render_context(&state(), &[]);
        let large = text.find("Story so far").unwrap();
        let small = text.find("sum-b").unwrap();
        let segment = text.find("## Latest turns\nc").unwrap();
        assert!(large < small && small < segment);
    }

    #[test]
    fn full_mode_renders_history() {
        let mut state = state();
        state.mode = ContextMode::Full;
        let records = vec![TextRecord::new(0, "one"), TextRecord::new(1, "two")];
        assert_eq!(render_context(&state, &records), "one\n\ntwo");
    }
}
