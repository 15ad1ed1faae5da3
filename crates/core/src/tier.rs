//! Tier types — the three retention levels that partition history by recency.
//!
//! | Tier | Covers | Payload |
//! |------|--------|---------|
//! | Large summary | everything older than the small summary | one cumulative summary + pending texts |
//! | Small summary | the `M` records before the segment | one summary per chunk piece |
//! | Segment | the `N` most recent records | verbatim text records |
//!
//! Ranges are half-open `[start, end)` over record sequences.

use serde::{Deserialize, Serialize};

use crate::record::{Sequence, TextRecord};

/// A half-open range of record sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SeqRange {
    pub start: Sequence,
    pub end: Sequence,
}

impl SeqRange {
    pub fn new(start: Sequence, end: Sequence) -> Self {
        debug_assert!(start <= end, "range start {start} after end {end}");
        Self { start, end }
    }

    /// An empty range anchored at `at`.
    pub fn empty_at(at: Sequence) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, sequence: Sequence) -> bool {
        sequence >= self.start && sequence < self.end
    }
}

impl std::fmt::Display for SeqRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Most recent records, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentTier {
    pub range: SeqRange,
    pub records: Vec<TextRecord>,
}

/// A contiguous slice of the small summary tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryPiece {
    /// The piece spans a whole aligned chunk and has been summarized.
    Summarized { range: SeqRange, summary: String },
    /// A partial chunk at either end of the tier; texts are held verbatim.
    Pending { range: SeqRange, texts: Vec<String> },
}

impl SummaryPiece {
    pub fn range(&self) -> SeqRange {
        match self {
            SummaryPiece::Summarized { range, .. } | SummaryPiece::Pending { range, .. } => *range,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SummaryPiece::Pending { .. })
    }
}

/// The `M` records just older than the segment, summarized per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmallSummaryTier {
    pub range: SeqRange,
    pub pieces: Vec<SummaryPiece>,
}

impl SmallSummaryTier {
    /// Number of summarizer outputs (excluding pending text).
    pub fn summary_count(&self) -> usize {
        self.pieces.iter().filter(|p| !p.is_pending()).count()
    }
}

/// Everything older than the small summary, folded into one running summary.
///
/// `summary` covers `[range.start, folded_until)`; `pending` holds the texts
/// of `[folded_until, range.end)` until their chunk completes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LargeSummaryTier {
    pub range: SeqRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub folded_until: Sequence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
}

/// The three tiers together, plus the chunk size they were built with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tiers {
    pub chunk_size: usize,
    pub segment: SegmentTier,
    pub small_summary: SmallSummaryTier,
    pub large_summary: LargeSummaryTier,
}

impl Tiers {
    /// Empty tiers for a given chunk size.
    pub fn empty(chunk_size: usize) -> Self {
        Self { chunk_size, ..Self::default() }
    }

    /// Number of records covered by the three tiers together.
    pub fn covered_len(&self) -> usize {
        self.large_summary.range.len() + self.small_summary.range.len() + self.segment.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covered_len() == 0
    }

    /// Check that the tiers cover exactly `[0, len)` without gaps or overlaps,
    /// and that each payload agrees with its range.
    pub fn covers_exactly(&self, len: usize) -> bool {
        let large = self.large_summary.range;
        let small = self.small_summary.range;
        let segment = self.segment.range;

        let ranges_ok = large.start == 0
            && large.end == small.start
            && small.end == segment.start
            && segment.end as usize == len;
        if !ranges_ok {
            return false;
        }

        let segment_ok = self.segment.records.len() == segment.len()
            && self
                .segment
                .records
                .iter()
                .zip(segment.start..segment.end)
                .all(|(r, seq)| r.sequence == seq);

        let mut cursor = small.start;
        for piece in &self.small_summary.pieces {
            let range = piece.range();
            if range.start != cursor || range.is_empty() {
                return false;
            }
            if let SummaryPiece::Pending { texts, .. } = piece {
                if texts.len() != range.len() {
                    return false;
                }
            }
            cursor = range.end;
        }
        let small_ok = cursor == small.end;

        let large_tier = &self.large_summary;
        let large_ok = large_tier.folded_until >= large.start
            && large_tier.folded_until <= large.end
            && large_tier.pending.len() == (large.end - large_tier.folded_until) as usize
            && large_tier.summary.is_some() == (large_tier.folded_until > large.start);

        segment_ok && small_ok && large_ok
    }
}
