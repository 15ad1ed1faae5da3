//! Sync controller — the single mutator of [`ContextState`].
//!
//! Every mutation runs under one in-flight guard (a FIFO `tokio::sync::Mutex`)
//! and follows the same shape:
//!
//! 1. Work on a copy: stage the record, compute the new tiers.
//! 2. Commit and publish once every awaited summarizer call has succeeded.
//! 3. Reconcile dirty keys with the world book if the gate is open.
//!
//! A future dropped during step 1 leaves nothing behind. A future dropped
//! during step 3 leaves the unreconciled keys dirty for the next pass.
//! Readers never take the guard: they read the latest [`ContextSnapshot`]
//! from a `watch` channel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use lorekeeper_config::{ContextSection, GuardPolicy};
use lorekeeper_core::context::{
    ContextConfig, ContextMode, ContextSettings, ContextState, Statistics,
};
use lorekeeper_core::error::ContextError;
use lorekeeper_core::event::{ContextEvent, EventBus};
use lorekeeper_core::record::{RawTurn, TextRecord};
use lorekeeper_core::store::{EntryKey, StoreAdapter, WorldEntry};
use lorekeeper_core::summarizer::Summarizer;
use lorekeeper_core::tier::{SeqRange, SummaryPiece, Tiers};
use lorekeeper_memory::RecordStore;
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tracing::{debug, info, warn};

use crate::calculator::{DEFAULT_CHUNK_SIZE, Layout, TierCalculator};
use crate::reconcile::reconcile;
use crate::render::{decode_settings, decode_tiers, desired_entry};
use crate::snapshot::ContextSnapshot;

/// Startup options for a [`SyncController`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Settings used when the world book holds none.
    pub initial: ContextSettings,
    pub chunk_size: usize,
    pub guard: GuardPolicy,
}

impl ControllerOptions {
    pub fn from_section(section: &ContextSection) -> Self {
        Self {
            initial: section.initial_settings(),
            chunk_size: section.chunk_size,
            guard: section.guard,
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            initial: ContextSettings::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            guard: GuardPolicy::Queue,
        }
    }
}

/// What [`SyncController::refresh`] found in the world book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Persisted settings differed from local ones and were adopted.
    pub settings_adopted: bool,
    /// Persisted tiers differed from local ones and were adopted.
    pub tiers_adopted: bool,
    /// Keys that still disagree with local state and are now dirty.
    pub diverged: Vec<EntryKey>,
}

/// Everything the guard protects.
struct Inner {
    records: RecordStore,
    state: ContextState,
    /// Keys whose external entry may not match `state`.
    dirty: BTreeSet<EntryKey>,
}

type Persisted = BTreeMap<EntryKey, WorldEntry>;

pub struct SyncController {
    inner: Mutex<Inner>,
    snapshot: watch::Sender<Arc<ContextSnapshot>>,
    calculator: TierCalculator,
    store: Arc<dyn StoreAdapter>,
    events: EventBus,
    guard: GuardPolicy,
}

impl SyncController {
    /// Load persisted state from the world book and build the controller.
    ///
    /// Persisted settings win over `options.initial`. Persisted tiers are
    /// adopted when they match the record history; otherwise tiers are
    /// recomputed and marked dirty.
    pub async fn open(
        records: RecordStore,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn StoreAdapter>,
        options: ControllerOptions,
    ) -> Result<Self, ContextError> {
        let calculator = TierCalculator::new(summarizer, options.chunk_size);
        let persisted = read_persisted(store.as_ref()).await?;

        let settings = decode_settings(persisted.get(&EntryKey::Settings)).unwrap_or(options.initial);
        let mut state = ContextState::new(settings, calculator.chunk_size());
        let texts = records.all_text_records();

        if state.mode == ContextMode::Segmented {
            state.tiers = match adoptable_tiers(&persisted, &texts, &state.config, calculator.chunk_size()) {
                Some(tiers) => tiers,
                None => calculator.recompute(&texts, &state.config, None).await?,
            };
        }
        let mut dirty: BTreeSet<EntryKey> = diverged_keys(&state, &persisted).into_iter().collect();
        let overwritten: Vec<EntryKey> = dirty.iter().copied().filter(|k| persisted.contains_key(k)).collect();
        if !overwritten.is_empty() {
            warn!(
                keys = ?overwritten,
                records = texts.len(),
                journaled = records.is_journaled(),
                "World book tiers do not match local history and will be replaced on the next sync"
            );
        }
        if !persisted.contains_key(&EntryKey::Settings) {
            dirty.insert(EntryKey::Settings);
        }

        info!(
            store = store.name(),
            summarizer = calculator.summarizer_name(),
            records = records.len(),
            mode = %state.mode,
            enabled = state.enabled,
            pending = dirty.len(),
            "Context engine ready"
        );

        let inner = Inner { records, state, dirty };
        let (snapshot, _) = watch::channel(Arc::new(snapshot_of(&inner)));

        Ok(Self {
            inner: Mutex::new(inner),
            snapshot,
            calculator,
            store,
            events: EventBus::default(),
            guard: options.guard,
        })
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    /// The latest published snapshot. Never waits for a running mutation.
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Watch published snapshots.
    pub fn watch(&self) -> watch::Receiver<Arc<ContextSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn statistics(&self) -> Statistics {
        self.snapshot().statistics()
    }

    pub fn render_context(&self) -> String {
        self.snapshot().render_context()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ContextEvent>> {
        self.events.subscribe()
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Record a turn and advance the tiers.
    ///
    /// If the summarizer fails, nothing is recorded and the turn can be
    /// appended again.
    pub async fn append(&self, turn: RawTurn) -> Result<TextRecord, ContextError> {
        let mut inner = self.acquire().await?;
        let staged = inner.records.stage(&turn)?;

        let tiers = match inner.state.mode {
            ContextMode::Segmented => {
                let history = inner.records.all_text_records();
                Some(
                    self.calculator
                        .incremental_append(&inner.state.tiers, &history, staged.text(), &inner.state.config)
                        .await?,
                )
            }
            ContextMode::Full => None,
        };

        let record = inner.records.commit(staged)?;
        if let Some(tiers) = tiers {
            replace_tiers(&mut inner, tiers);
        }
        self.publish(&inner);
        debug!(sequence = record.sequence, "Turn recorded");
        self.events.publish(ContextEvent::RecordAppended {
            sequence: record.sequence,
            timestamp: Utc::now(),
        });

        self.sync(&mut inner).await?;
        Ok(record)
    }

    pub async fn set_segment_count(&self, count: i64) -> Result<(), ContextError> {
        let segment_count = ContextConfig::validate_count("segment_count", count)?;
        let mut inner = self.acquire().await?;
        let config = ContextConfig { segment_count, ..inner.state.config };
        self.apply_config(&mut inner, config).await
    }

    pub async fn set_small_summary_count(&self, count: i64) -> Result<(), ContextError> {
        let small_summary_count = ContextConfig::validate_count("small_summary_count", count)?;
        let mut inner = self.acquire().await?;
        let config = ContextConfig { small_summary_count, ..inner.state.config };
        self.apply_config(&mut inner, config).await
    }

    pub async fn switch_mode(&self, mode: ContextMode) -> Result<(), ContextError> {
        let mut inner = self.acquire().await?;
        if inner.state.mode == mode {
            return Ok(());
        }

        let tiers = match mode {
            ContextMode::Full => Tiers::empty(self.calculator.chunk_size()),
            ContextMode::Segmented => {
                let texts = inner.records.all_text_records();
                self.calculator.recompute(&texts, &inner.state.config, None).await?
            }
        };

        inner.state.mode = mode;
        inner.state.tiers = tiers;
        inner.dirty.extend(EntryKey::ALL);
        self.publish(&inner);
        info!(%mode, "Context mode switched");
        self.events.publish(ContextEvent::ModeSwitched { mode, timestamp: Utc::now() });

        self.sync(&mut inner).await
    }

    /// Rebuild every tier from scratch and rewrite every managed entry.
    pub async fn regenerate_segments(&self) -> Result<(), ContextError> {
        let mut inner = self.acquire().await?;
        if inner.state.mode == ContextMode::Full {
            debug!("Full mode has no tiers to regenerate");
            return Ok(());
        }

        let texts = inner.records.all_text_records();
        let tiers = self.calculator.recompute(&texts, &inner.state.config, None).await?;

        inner.state.tiers = tiers;
        inner.dirty.extend(EntryKey::ALL);
        self.publish(&inner);
        info!(records = texts.len(), "Tiers regenerated");
        self.events.publish(ContextEvent::TiersRecomputed {
            reason: "regenerate".into(),
            text_count: texts.len(),
            timestamp: Utc::now(),
        });

        self.sync(&mut inner).await
    }

    /// Wipe history and tiers. Tier entries are deleted from the world book
    /// when the gate is open or `force` is set; the settings entry stays.
    pub async fn clear_all(&self, force: bool) -> Result<(), ContextError> {
        let mut inner = self.acquire().await?;
        inner.records.clear()?;
        inner.state.tiers = Tiers::empty(self.calculator.chunk_size());
        inner.dirty.extend(EntryKey::TIERS);
        self.publish(&inner);

        let external = inner.state.enabled || force;
        info!(external, "Context cleared");
        self.events.publish(ContextEvent::Cleared { external, timestamp: Utc::now() });

        if external {
            self.push(&mut inner, &EntryKey::TIERS).await
        } else {
            self.touch(&mut inner);
            Ok(())
        }
    }

    /// Open or close the sync gate. Only the settings entry is written.
    ///
    /// The settings entry is written even when closing the gate, so the
    /// world book records that sync is off. It is the one key that bypasses
    /// the gate; tier changes made while closed stay local.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), ContextError> {
        let mut inner = self.acquire().await?;
        if inner.state.enabled == enabled {
            return Ok(());
        }

        inner.state.enabled = enabled;
        inner.dirty.insert(EntryKey::Settings);
        self.publish(&inner);
        info!(enabled, "Context sync gate changed");
        self.events.publish(ContextEvent::EnabledChanged { enabled, timestamp: Utc::now() });

        self.push(&mut inner, &[EntryKey::Settings]).await
    }

    /// Re-read the world book and resync local state from it.
    ///
    /// Persisted settings are adopted. Persisted tiers are adopted only when
    /// they line up with the local history; otherwise local tiers are kept
    /// and the disagreeing keys are marked dirty. Nothing is written.
    pub async fn refresh(&self) -> Result<RefreshReport, ContextError> {
        let mut inner = self.acquire().await?;
        let persisted = read_persisted(self.store.as_ref()).await?;
        let texts = inner.records.all_text_records();
        let chunk_size = self.calculator.chunk_size();

        let mut state = inner.state.clone();
        let mut report = RefreshReport::default();

        let adopted_settings = decode_settings(persisted.get(&EntryKey::Settings));
        if let Some(settings) = adopted_settings {
            report.settings_adopted = settings != state.settings();
            state.mode = settings.mode;
            state.enabled = settings.enabled;
            state.config = settings.config;
        }

        state.tiers = match state.mode {
            ContextMode::Full => Tiers::empty(chunk_size),
            ContextMode::Segmented => match adoptable_tiers(&persisted, &texts, &state.config, chunk_size) {
                Some(tiers) => {
                    report.tiers_adopted = tiers != state.tiers;
                    tiers
                }
                None => {
                    let previous = Some(&inner.state.tiers).filter(|t| !t.is_empty());
                    self.calculator.recompute(&texts, &state.config, previous).await?
                }
            },
        };

        report.diverged = diverged_keys(&state, &persisted);
        if adopted_settings.is_some() {
            inner.dirty.remove(&EntryKey::Settings);
        }
        for key in EntryKey::TIERS {
            inner.dirty.remove(&key);
        }
        inner.dirty.extend(report.diverged.iter().copied());

        if report.diverged.is_empty() {
            state.last_update_time = Some(Utc::now());
        } else {
            warn!(diverged = ?report.diverged, "World book disagrees with local tiers");
        }
        inner.state = state;
        self.publish(&inner);
        info!(
            settings_adopted = report.settings_adopted,
            tiers_adopted = report.tiers_adopted,
            "Context refreshed from world book"
        );

        Ok(report)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    async fn acquire(&self) -> Result<MutexGuard<'_, Inner>, ContextError> {
        match self.guard {
            GuardPolicy::Queue => Ok(self.inner.lock().await),
            GuardPolicy::Reject => self.inner.try_lock().map_err(|_| {
                debug!("Rejecting mutation, another one is in flight");
                ContextError::ConcurrencyRejected
            }),
        }
    }

    async fn apply_config(&self, inner: &mut Inner, config: ContextConfig) -> Result<(), ContextError> {
        if inner.state.config == config {
            return Ok(());
        }

        let tiers = match inner.state.mode {
            ContextMode::Segmented => {
                let texts = inner.records.all_text_records();
                Some(self.calculator.recompute(&texts, &config, Some(&inner.state.tiers)).await?)
            }
            ContextMode::Full => None,
        };

        inner.state.config = config;
        inner.dirty.insert(EntryKey::Settings);
        if let Some(tiers) = tiers {
            replace_tiers(inner, tiers);
            self.events.publish(ContextEvent::TiersRecomputed {
                reason: "config".into(),
                text_count: inner.records.len(),
                timestamp: Utc::now(),
            });
        }
        self.publish(inner);
        info!(
            segment_count = config.segment_count,
            small_summary_count = config.small_summary_count,
            "Context config updated"
        );

        self.sync(inner).await
    }

    /// Reconcile every dirty key if the gate is open.
    async fn sync(&self, inner: &mut Inner) -> Result<(), ContextError> {
        if !inner.state.enabled {
            debug!(pending = inner.dirty.len(), "Context sync disabled, keeping changes local");
            self.touch(inner);
            return Ok(());
        }
        let keys: Vec<EntryKey> = inner.dirty.iter().copied().collect();
        self.push(inner, &keys).await
    }

    /// Reconcile `keys` regardless of the gate.
    async fn push(&self, inner: &mut Inner, keys: &[EntryKey]) -> Result<(), ContextError> {
        let report = reconcile(self.store.as_ref(), &inner.state, keys).await;
        for key in report.succeeded() {
            inner.dirty.remove(&key);
        }

        let written = report.written.clone();
        let deleted = report.deleted.clone();
        match report.into_error() {
            None => {
                if !keys.is_empty() {
                    self.events.publish(ContextEvent::Reconciled {
                        written,
                        deleted,
                        timestamp: Utc::now(),
                    });
                }
                self.touch(inner);
                Ok(())
            }
            Some(err) => {
                if let ContextError::Store { failed, reason, .. } = &err {
                    self.events.publish(ContextEvent::ReconcileFailed {
                        failed: failed.clone(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    });
                }
                self.publish(inner);
                Err(err)
            }
        }
    }

    fn touch(&self, inner: &mut Inner) {
        inner.state.last_update_time = Some(Utc::now());
        self.publish(inner);
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot.send_replace(Arc::new(snapshot_of(inner)));
    }
}

fn snapshot_of(inner: &Inner) -> ContextSnapshot {
    ContextSnapshot {
        state: inner.state.clone(),
        records: inner.records.all_text_records(),
        record_count: inner.records.len(),
        pending_keys: inner.dirty.iter().copied().collect(),
    }
}

/// Swap in new tiers, marking the tier keys whose content changed.
fn replace_tiers(inner: &mut Inner, tiers: Tiers) {
    let old = &inner.state.tiers;
    let regrid = old.chunk_size != tiers.chunk_size;
    let changed = [
        (EntryKey::Segment, old.segment != tiers.segment),
        (EntryKey::SmallSummary, old.small_summary != tiers.small_summary),
        (EntryKey::LargeSummary, old.large_summary != tiers.large_summary),
    ];
    for (key, differs) in changed {
        if differs || regrid {
            inner.dirty.insert(key);
        }
    }
    inner.state.tiers = tiers;
}

async fn read_persisted(store: &dyn StoreAdapter) -> Result<Persisted, ContextError> {
    let mut persisted = Persisted::new();
    let mut failures = Vec::new();

    for key in EntryKey::ALL {
        match store.read_entry(key).await {
            Ok(Some(entry)) => {
                persisted.insert(key, entry);
            }
            Ok(None) => {}
            Err(e) => failures.push(e),
        }
    }

    if failures.is_empty() {
        return Ok(persisted);
    }
    Err(ContextError::Store {
        retryable: failures.iter().all(|f| f.retryable),
        succeeded: persisted.keys().copied().collect(),
        failed: failures.iter().map(|f| f.key).collect(),
        reason: failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "),
    })
}

/// Persisted tiers, if they exactly cover `texts`, have the shape `config`
/// plans for that length, and hold the same verbatim texts.
fn adoptable_tiers(
    persisted: &Persisted,
    texts: &[TextRecord],
    config: &ContextConfig,
    chunk_size: usize,
) -> Option<Tiers> {
    let has_any = EntryKey::TIERS.iter().any(|k| persisted.contains_key(k));
    if !has_any && !texts.is_empty() {
        return None;
    }

    let tiers = decode_tiers(
        persisted.get(&EntryKey::Segment),
        persisted.get(&EntryKey::SmallSummary),
        persisted.get(&EntryKey::LargeSummary),
        chunk_size,
    )?;
    if !tiers.covers_exactly(texts.len()) {
        return None;
    }
    if !Layout::plan(texts.len(), config, chunk_size).matches(&tiers) {
        warn!("Persisted tiers are off the chunk grid, recomputing");
        return None;
    }

    let verbatim = |range: SeqRange, held: &[String]| {
        texts
            .get(range.start as usize..range.end as usize)
            .is_some_and(|slice| slice.iter().map(|r| &r.text).eq(held.iter()))
    };
    let range = tiers.segment.range;
    let tail = texts.get(range.start as usize..range.end as usize)?;
    let large = &tiers.large_summary;
    let consistent = tiers.segment.records == tail
        && verbatim(SeqRange::new(large.folded_until, large.range.end), large.pending.as_slice())
        && tiers.small_summary.pieces.iter().all(|piece| match piece {
            SummaryPiece::Pending { range, texts } => verbatim(*range, texts.as_slice()),
            SummaryPiece::Summarized { .. } => true,
        });
    consistent.then_some(tiers)
}

/// Managed keys whose persisted entry differs from what `state` wants.
fn diverged_keys(state: &ContextState, persisted: &Persisted) -> Vec<EntryKey> {
    EntryKey::TIERS
        .into_iter()
        .filter(|&key| {
            let desired = desired_entry(state, key);
            match (desired, persisted.get(&key)) {
                (None, None) => false,
                (Some(want), Some(have)) => want.content != have.content || want.payload != have.payload,
                _ => true,
            }
        })
        .collect()
}
