//! Tier calculator — partitions history into segment, small summary, and
//! large summary tiers.
//!
//! Layout is planned first (pure range arithmetic), then materialized by
//! calling the summarizer for whatever the previous tiers cannot supply.
//! Both [`TierCalculator::recompute`] and [`TierCalculator::incremental_append`]
//! go through the same planner and materializer, so appending one record at
//! a time always lands on the tiers a full recompute would produce.
//!
//! Summarization work is aligned to absolute chunk boundaries (multiples of
//! `chunk_size`). A small summary piece is summarized only when it spans a
//! whole chunk; the partial pieces at either end of the tier stay verbatim.
//! The large summary folds whole chunks into its running summary with
//! [`Summarizer::merge`].

use std::sync::Arc;

use lorekeeper_core::context::ContextConfig;
use lorekeeper_core::error::SummarizerError;
use lorekeeper_core::record::{Sequence, TextRecord};
use lorekeeper_core::summarizer::Summarizer;
use lorekeeper_core::tier::{
    LargeSummaryTier, SegmentTier, SeqRange, SmallSummaryTier, SummaryPiece, Tiers,
};
use tracing::{debug, warn};

/// Records per summarization chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

// ── Layout ──────────────────────────────────────────────────────────────────

/// One planned piece of the small summary tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiecePlan {
    pub range: SeqRange,
    /// The piece spans a whole aligned chunk and gets a summary.
    pub summarized: bool,
}

/// Where every tier boundary falls for a history of a given length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub large: SeqRange,
    /// End of the whole chunks folded into the large summary.
    pub large_folded_until: Sequence,
    pub small: SeqRange,
    pub small_pieces: Vec<PiecePlan>,
    pub segment: SeqRange,
}

impl Layout {
    /// Plan the tier boundaries for `len` records.
    ///
    /// ```text
    /// 0                small.start        segment.start        len
    /// |---- large -----|------ small -----|------ segment -----|
    /// ```
    pub fn plan(len: usize, config: &ContextConfig, chunk_size: usize) -> Self {
        let chunk = chunk_size.max(1) as Sequence;
        let len = len as Sequence;

        let segment_start = len.saturating_sub(config.segment_count as Sequence);
        let small_start = segment_start.saturating_sub(config.small_summary_count as Sequence);

        let segment = SeqRange::new(segment_start, len);
        let small = SeqRange::new(small_start, segment_start);
        let large = SeqRange::new(0, small_start);

        let mut small_pieces = Vec::new();
        let mut cursor = small.start;
        while cursor < small.end {
            let chunk_start = (cursor / chunk) * chunk;
            let chunk_end = chunk_start + chunk;
            let end = chunk_end.min(small.end);
            small_pieces.push(PiecePlan {
                range: SeqRange::new(cursor, end),
                summarized: cursor == chunk_start && end == chunk_end,
            });
            cursor = end;
        }

        Self {
            large,
            large_folded_until: (large.end / chunk) * chunk,
            small,
            small_pieces,
            segment,
        }
    }

    /// Whether `tiers` has exactly this shape: tier lengths, piece ranges and
    /// kinds, and fold point.
    ///
    /// Tiers built elsewhere (read back from the world book) must pass this
    /// before being extended, or later appends would fold from the wrong
    /// offset.
    pub fn matches(&self, tiers: &Tiers) -> bool {
        let pieces = &tiers.small_summary.pieces;
        tiers.segment.range.len() == self.segment.len()
            && tiers.small_summary.range.len() == self.small.len()
            && tiers.large_summary.range.len() == self.large.len()
            && tiers.large_summary.folded_until == self.large_folded_until
            && pieces.len() == self.small_pieces.len()
            && pieces
                .iter()
                .zip(&self.small_pieces)
                .all(|(piece, plan)| piece.range() == plan.range && piece.is_pending() != plan.summarized)
    }
}

// ── History view ────────────────────────────────────────────────────────────

/// Committed records plus an optional record not yet committed.
///
/// Lets the calculator work on "history + one" without copying the history.
#[derive(Clone, Copy)]
struct History<'a> {
    committed: &'a [TextRecord],
    staged: Option<&'a TextRecord>,
}

impl<'a> History<'a> {
    fn len(&self) -> usize {
        self.committed.len() + usize::from(self.staged.is_some())
    }

    fn get(&self, sequence: Sequence) -> Option<&'a TextRecord> {
        let index = sequence as usize;
        self.committed
            .get(index)
            .or_else(|| self.staged.filter(|_| index == self.committed.len()))
    }

    fn records(&self, range: SeqRange) -> Vec<TextRecord> {
        (range.start..range.end).filter_map(|s| self.get(s)).cloned().collect()
    }

    fn texts(&self, range: SeqRange) -> Vec<String> {
        (range.start..range.end).filter_map(|s| self.get(s)).map(|r| r.text.clone()).collect()
    }
}

// ── Calculator ──────────────────────────────────────────────────────────────

/// Computes [`Tiers`] from text records.
pub struct TierCalculator {
    summarizer: Arc<dyn Summarizer>,
    chunk_size: usize,
}

impl TierCalculator {
    pub fn new(summarizer: Arc<dyn Summarizer>, chunk_size: usize) -> Self {
        Self { summarizer, chunk_size: chunk_size.max(1) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn summarizer_name(&self) -> &str {
        self.summarizer.name()
    }

    /// Compute the tiers for `records` from scratch.
    ///
    /// When `previous` is given, summaries whose inputs are unchanged are
    /// reused instead of regenerated. The result is the same either way.
    pub async fn recompute(
        &self,
        records: &[TextRecord],
        config: &ContextConfig,
        previous: Option<&Tiers>,
    ) -> Result<Tiers, SummarizerError> {
        let history = History { committed: records, staged: None };
        self.materialize(history, config, previous).await
    }

    /// Advance `previous` by one record.
    ///
    /// `history` holds the records `previous` was computed from; `record` is
    /// the new one. Boundary records cross tiers and, when a chunk completes,
    /// get summarized. On failure `previous` is untouched and the error is
    /// returned.
    pub async fn incremental_append(
        &self,
        previous: &Tiers,
        history: &[TextRecord],
        record: &TextRecord,
        config: &ContextConfig,
    ) -> Result<Tiers, SummarizerError> {
        if previous.covered_len() != history.len() || record.sequence as usize != history.len() {
            warn!(
                covered = previous.covered_len(),
                history = history.len(),
                sequence = record.sequence,
                "Previous tiers do not line up with history, recomputing"
            );
        }
        let view = History { committed: history, staged: Some(record) };
        self.materialize(view, config, Some(previous)).await
    }

    async fn materialize(
        &self,
        history: History<'_>,
        config: &ContextConfig,
        previous: Option<&Tiers>,
    ) -> Result<Tiers, SummarizerError> {
        let layout = Layout::plan(history.len(), config, self.chunk_size);
        // Summaries built on a different chunk grid cannot be reused.
        let previous = previous.filter(|p| p.chunk_size == self.chunk_size);

        let large_summary = self.build_large(&layout, history, previous).await?;
        let small_summary = self.build_small(&layout, history, previous).await?;
        let segment = SegmentTier {
            range: layout.segment,
            records: history.records(layout.segment),
        };

        let tiers = Tiers { chunk_size: self.chunk_size, segment, small_summary, large_summary };
        debug_assert!(tiers.covers_exactly(history.len()));
        Ok(tiers)
    }

    async fn build_small(
        &self,
        layout: &Layout,
        history: History<'_>,
        previous: Option<&Tiers>,
    ) -> Result<SmallSummaryTier, SummarizerError> {
        let mut pieces = Vec::with_capacity(layout.small_pieces.len());

        for plan in &layout.small_pieces {
            let texts = history.texts(plan.range);
            if !plan.summarized {
                pieces.push(SummaryPiece::Pending { range: plan.range, texts });
                continue;
            }

            let reused = previous.and_then(|p| {
                p.small_summary.pieces.iter().find_map(|piece| match piece {
                    SummaryPiece::Summarized { range, summary } if *range == plan.range => {
                        Some(summary.clone())
                    }
                    _ => None,
                })
            });

            let summary = match reused {
                Some(summary) => summary,
                None => {
                    debug!(range = %plan.range, "Summarizing small summary piece");
                    self.summarizer.summarize(&texts).await?
                }
            };
            pieces.push(SummaryPiece::Summarized { range: plan.range, summary });
        }

        Ok(SmallSummaryTier { range: layout.small, pieces })
    }

    async fn build_large(
        &self,
        layout: &Layout,
        history: History<'_>,
        previous: Option<&Tiers>,
    ) -> Result<LargeSummaryTier, SummarizerError> {
        let target = layout.large_folded_until;
        let chunk = self.chunk_size as Sequence;

        // Continue the previous fold when it is a prefix of the one we need.
        let (mut summary, mut cursor) = match previous.map(|p| &p.large_summary) {
            Some(prev) if prev.folded_until > 0 && prev.folded_until <= target => {
                match &prev.summary {
                    Some(s) => (Some(s.clone()), prev.folded_until),
                    None => (None, 0),
                }
            }
            _ => (None, 0),
        };

        while cursor < target {
            let range = SeqRange::new(cursor, cursor + chunk);
            let texts = history.texts(range);
            summary = Some(match summary {
                None => {
                    debug!(%range, "Starting large summary");
                    self.summarizer.summarize(&texts).await?
                }
                Some(prev) => {
                    debug!(%range, "Folding chunk into large summary");
                    self.summarizer.merge(&prev, &texts).await?
                }
            });
            cursor = range.end;
        }

        Ok(LargeSummaryTier {
            range: layout.large,
            summary,
            folded_until: target,
            pending: history.texts(SeqRange::new(target, layout.large.end)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic summarizer that records how often it was called.
    #[derive(Default)]
    struct Echo {
        summarize_calls: AtomicUsize,
        merge_calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn summarize(&self, texts: &[String]) -> Result<String, SummarizerError> {
            self.summarize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("S({})", texts.join(",")))
        }

        async fn merge(&self, previous: &str, texts: &[String]) -> Result<String, SummarizerError> {
            self.merge_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("M({previous}|{})", texts.join(",")))
        }
    }

    /// Records the number of texts in every summarizer call.
    struct Sizes(Arc<std::sync::Mutex<Vec<usize>>>);

    #[async_trait]
    impl Summarizer for Sizes {
        fn name(&self) -> &str {
            "sizes"
        }

        async fn summarize(&self, texts: &[String]) -> Result<String, SummarizerError> {
            self.0.lock().unwrap().push(texts.len());
            Ok(texts.join(" "))
        }

        async fn merge(&self, previous: &str, texts: &[String]) -> Result<String, SummarizerError> {
            self.0.lock().unwrap().push(texts.len());
            Ok(format!("{previous} {}", texts.join(" ")))
        }
    }

    struct Broken;

    #[async_trait]
    impl Summarizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn summarize(&self, _texts: &[String]) -> Result<String, SummarizerError> {
            Err(SummarizerError::retryable("model offline"))
        }

        async fn merge(&self, _previous: &str, _texts: &[String]) -> Result<String, SummarizerError> {
            Err(SummarizerError::retryable("model offline"))
        }
    }

    fn records(n: usize) -> Vec<TextRecord> {
        (0..n).map(|i| TextRecord::new(i as Sequence, format!("t{i}"))).collect()
    }

    fn calculator(chunk: usize) -> (Arc<Echo>, TierCalculator) {
        let echo = Arc::new(Echo::default());
        let calc = TierCalculator::new(echo.clone(), chunk);
        (echo, calc)
    }

    #[test]
    fn layout_for_thirty_records() {
        let layout = Layout::plan(30, &ContextConfig::new(3, 25), 5);
        assert_eq!(layout.segment, SeqRange::new(27, 30));
        assert_eq!(layout.small, SeqRange::new(2, 27));
        assert_eq!(layout.large, SeqRange::new(0, 2));
        assert_eq!(layout.large_folded_until, 0);
    }

    #[test]
    fn layout_after_one_more_record() {
        let layout = Layout::plan(31, &ContextConfig::new(3, 25), 5);
        assert_eq!(layout.segment, SeqRange::new(28, 31));
        assert_eq!(layout.small, SeqRange::new(3, 28));
        assert_eq!(layout.large, SeqRange::new(0, 3));
    }

    #[test]
    fn short_history_fills_segment_first() {
        let layout = Layout::plan(2, &ContextConfig::new(3, 25), 5);
        assert_eq!(layout.segment, SeqRange::new(0, 2));
        assert!(layout.small.is_empty());
        assert!(layout.large.is_empty());
    }

    #[test]
    fn small_pieces_align_to_chunks() {
        let layout = Layout::plan(30, &ContextConfig::new(3, 25), 5);
        let ranges: Vec<_> = layout.small_pieces.iter().map(|p| (p.range.start, p.range.end, p.summarized)).collect();
        assert_eq!(
            ranges,
            vec![
                (2, 5, false),
                (5, 10, true),
                (10, 15, true),
                (15, 20, true),
                (20, 25, true),
                (25, 27, false),
            ]
        );
    }

    #[tokio::test]
    async fn layout_matches_computed_tiers_only() {
        let (_, calc) = calculator(5);
        let config = ContextConfig::new(3, 0);
        let layout = Layout::plan(10, &config, 5);
        let tiers = calc.recompute(&records(10), &config, None).await.unwrap();
        assert!(layout.matches(&tiers));

        // Fold point off the chunk grid, still a valid cover.
        let mut off_grid = tiers.clone();
        off_grid.large_summary.summary = Some("X".into());
        off_grid.large_summary.folded_until = 3;
        off_grid.large_summary.pending = vec!["t3".into(), "t4".into(), "t5".into(), "t6".into()];
        assert!(off_grid.covers_exactly(10));
        assert!(!layout.matches(&off_grid));

        assert!(!Layout::plan(10, &ContextConfig::new(4, 0), 5).matches(&tiers));
    }

    #[tokio::test]
    async fn scenario_thirty_then_thirty_one() {
        let (_, calc) = calculator(5);
        let config = ContextConfig::new(3, 25);
        let history = records(31);

        let tiers = calc.recompute(&history[..30], &config, None).await.unwrap();
        assert!(tiers.covers_exactly(30));
        assert_eq!(tiers.segment.records.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![27, 28, 29]);
        assert_eq!(tiers.large_summary.pending, vec!["t0".to_string(), "t1".to_string()]);

        let next = calc.incremental_append(&tiers, &history[..30], &history[30], &config).await.unwrap();
        assert!(next.covers_exactly(31));
        assert_eq!(next.segment.range, SeqRange::new(28, 31));
        assert_eq!(next.small_summary.range, SeqRange::new(3, 28));
        assert_eq!(next.large_summary.range, SeqRange::new(0, 3));
    }

    #[tokio::test]
    async fn incremental_matches_recompute_at_every_length() {
        let (_, calc) = calculator(3);
        let config = ContextConfig::new(2, 7);
        let history = records(40);

        let mut tiers = Tiers::empty(3);
        for i in 0..history.len() {
            tiers = calc.incremental_append(&tiers, &history[..i], &history[i], &config).await.unwrap();
            let fresh = calc.recompute(&history[..=i], &config, None).await.unwrap();
            assert_eq!(tiers, fresh, "diverged after {} records", i + 1);
        }
    }

    #[tokio::test]
    async fn append_reuses_completed_work() {
        let (echo, calc) = calculator(5);
        let config = ContextConfig::new(3, 25);
        let history = records(61);

        let tiers = calc.recompute(&history[..60], &config, None).await.unwrap();
        let summarize_before = echo.summarize_calls.load(Ordering::SeqCst);
        let merge_before = echo.merge_calls.load(Ordering::SeqCst);

        calc.incremental_append(&tiers, &history[..60], &history[60], &config).await.unwrap();

        // No chunk completed, so nothing is summarized.
        assert_eq!(echo.summarize_calls.load(Ordering::SeqCst), summarize_before);
        assert_eq!(echo.merge_calls.load(Ordering::SeqCst), merge_before);
    }

    #[tokio::test]
    async fn summarizer_only_sees_whole_chunks() {
        let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calc = TierCalculator::new(Arc::new(Sizes(sizes.clone())), 5);
        let config = ContextConfig::new(3, 25);
        let history = records(40);

        let mut tiers = calc.recompute(&history[..30], &config, None).await.unwrap();
        sizes.lock().unwrap().clear();
        for i in 30..40 {
            tiers = calc.incremental_append(&tiers, &history[..i], &history[i], &config).await.unwrap();
        }

        let sizes = sizes.lock().unwrap().clone();
        // Small tier completes [25,30) and [30,35); the large summary
        // starts with [0,5) and folds in [5,10).
        assert_eq!(sizes.len(), 4, "calls: {sizes:?}");
        assert!(sizes.iter().all(|&n| n == 5), "partial chunk summarized: {sizes:?}");
        assert!(tiers.covers_exactly(40));
    }

    #[tokio::test]
    async fn leading_partial_piece_stays_verbatim() {
        let (_, calc) = calculator(5);
        let tiers = calc.recompute(&records(31), &ContextConfig::new(3, 25), None).await.unwrap();
        assert_eq!(
            tiers.small_summary.pieces.first(),
            Some(&SummaryPiece::Pending {
                range: SeqRange::new(3, 5),
                texts: vec!["t3".to_string(), "t4".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn large_summary_folds_whole_chunks() {
        let (_, calc) = calculator(2);
        let config = ContextConfig::new(1, 1);
        let tiers = calc.recompute(&records(7), &config, None).await.unwrap();

        assert_eq!(tiers.large_summary.range, SeqRange::new(0, 5));
        assert_eq!(tiers.large_summary.folded_until, 4);
        assert_eq!(tiers.large_summary.summary.as_deref(), Some("M(S(t0,t1)|t2,t3)"));
        assert_eq!(tiers.large_summary.pending, vec!["t4".to_string()]);
    }

    #[tokio::test]
    async fn zero_segment_count_removes_segment() {
        let (_, calc) = calculator(5);
        let tiers = calc.recompute(&records(10), &ContextConfig::new(0, 4), None).await.unwrap();
        assert!(tiers.segment.range.is_empty());
        assert!(tiers.segment.records.is_empty());
        assert_eq!(tiers.small_summary.range, SeqRange::new(6, 10));
        assert!(tiers.covers_exactly(10));
    }

    #[tokio::test]
    async fn zero_small_count_sends_everything_older_to_large() {
        let (_, calc) = calculator(5);
        let tiers = calc.recompute(&records(10), &ContextConfig::new(3, 0), None).await.unwrap();
        assert!(tiers.small_summary.range.is_empty());
        assert!(tiers.small_summary.pieces.is_empty());
        assert_eq!(tiers.large_summary.range, SeqRange::new(0, 7));
        assert!(tiers.covers_exactly(10));
    }

    #[tokio::test]
    async fn empty_history_yields_empty_tiers() {
        let (echo, calc) = calculator(5);
        let tiers = calc.recompute(&[], &ContextConfig::default(), None).await.unwrap();
        assert!(tiers.is_empty());
        assert_eq!(echo.summarize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shrinking_large_restarts_fold() {
        let (_, calc) = calculator(2);
        let history = records(12);
        let wide = calc.recompute(&history, &ContextConfig::new(1, 1), None).await.unwrap();
        let narrow_reused = calc.recompute(&history, &ContextConfig::new(1, 7), Some(&wide)).await.unwrap();
        let narrow_fresh = calc.recompute(&history, &ContextConfig::new(1, 7), None).await.unwrap();
        assert_eq!(narrow_reused, narrow_fresh);
    }

    #[tokio::test]
    async fn chunk_size_change_ignores_previous() {
        let (_, calc2) = calculator(2);
        let (_, calc3) = calculator(3);
        let history = records(20);
        let config = ContextConfig::new(2, 5);
        let old = calc2.recompute(&history, &config, None).await.unwrap();
        let reused = calc3.recompute(&history, &config, Some(&old)).await.unwrap();
        let fresh = calc3.recompute(&history, &config, None).await.unwrap();
        assert_eq!(reused, fresh);
    }

    #[tokio::test]
    async fn summarizer_failure_is_reported() {
        let calc = TierCalculator::new(Arc::new(Broken), 5);
        let history = records(40);
        let err = calc.recompute(&history, &ContextConfig::default(), None).await.unwrap_err();
        assert!(err.retryable);
    }
}
