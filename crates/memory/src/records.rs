//! Record store — append-only ledger of raw turns and their extracted text.
//!
//! Optionally journaled to a JSON-lines file (one committed record per line)
//! so a history survives process restarts. Snapshots handed out by
//! [`RecordStore::all_text_records`] are copy-on-write: later appends never
//! touch a snapshot a reader already holds.

use chrono::Utc;
use lorekeeper_core::error::RecordError;
use lorekeeper_core::record::{HistoryRecord, RawTurn, Sequence, TextRecord};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::extract::TextExtractor;

/// A record that has been extracted and numbered but not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    history: HistoryRecord,
    text: TextRecord,
}

impl StagedRecord {
    pub fn sequence(&self) -> Sequence {
        self.history.sequence
    }

    pub fn text(&self) -> &TextRecord {
        &self.text
    }
}

/// One journal line.
#[derive(Serialize, Deserialize)]
struct JournalLine {
    record: HistoryRecord,
    text: String,
}

/// Append-only ledger of history and text records.
pub struct RecordStore {
    extractor: TextExtractor,
    history: Arc<Vec<HistoryRecord>>,
    texts: Arc<Vec<TextRecord>>,
    journal: Option<PathBuf>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(TextExtractor::default())
    }
}

impl RecordStore {
    /// An in-memory store with no journal.
    pub fn new(extractor: TextExtractor) -> Self {
        Self {
            extractor,
            history: Arc::new(Vec::new()),
            texts: Arc::new(Vec::new()),
            journal: None,
        }
    }

    /// Open (or start) a journaled store at `path`.
    ///
    /// Lines that fail to parse or break the sequence order are skipped.
    pub fn open(path: impl Into<PathBuf>, extractor: TextExtractor) -> Result<Self, RecordError> {
        let path = path.into();
        let (history, texts) = Self::load_journal(&path)?;
        debug!(path = %path.display(), count = history.len(), "Record journal loaded");
        Ok(Self {
            extractor,
            history: Arc::new(history),
            texts: Arc::new(texts),
            journal: Some(path),
        })
    }

    fn load_journal(path: &Path) -> Result<(Vec<HistoryRecord>, Vec<TextRecord>), RecordError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => return Err(RecordError::Journal(format!("Failed to read journal: {e}"))),
        };

        let mut history = Vec::new();
        let mut texts = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let entry = match serde_json::from_str::<JournalLine>(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted journal line");
                    continue;
                }
            };
            let expected = history.len() as Sequence;
            if entry.record.sequence != expected {
                warn!(expected, got = entry.record.sequence, "Skipping out-of-order journal line");
                continue;
            }
            texts.push(TextRecord::new(expected, entry.text));
            history.push(entry.record);
        }
        Ok((history, texts))
    }

    /// Extract and number a turn without committing it.
    pub fn stage(&self, turn: &RawTurn) -> Result<StagedRecord, RecordError> {
        let text = self
            .extractor
            .extract(&turn.text)
            .ok_or_else(|| RecordError::Empty(turn.text.chars().take(80).collect()))?;
        let sequence = self.history.len() as Sequence;
        Ok(StagedRecord {
            history: HistoryRecord {
                sequence,
                role: turn.role,
                raw_text: turn.text.clone(),
                created_at: Utc::now(),
            },
            text: TextRecord::new(sequence, text),
        })
    }

    /// Commit a staged record. The journal line is written before the
    /// in-memory ledger changes.
    pub fn commit(&mut self, staged: StagedRecord) -> Result<TextRecord, RecordError> {
        let expected = self.history.len() as Sequence;
        if staged.sequence() != expected {
            return Err(RecordError::Stale { expected, got: staged.sequence() });
        }

        if let Some(path) = &self.journal {
            let line = serde_json::to_string(&JournalLine {
                record: staged.history.clone(),
                text: staged.text.text.clone(),
            })
            .map_err(|e| RecordError::Journal(format!("Failed to serialize record: {e}")))?;
            append_line(path, &line)?;
        }

        Arc::make_mut(&mut self.history).push(staged.history);
        Arc::make_mut(&mut self.texts).push(staged.text.clone());
        Ok(staged.text)
    }

    /// Stage and commit in one step.
    pub fn append(&mut self, turn: &RawTurn) -> Result<TextRecord, RecordError> {
        let staged = self.stage(turn)?;
        self.commit(staged)
    }

    /// Full text history in ascending sequence order.
    pub fn all_text_records(&self) -> Arc<Vec<TextRecord>> {
        Arc::clone(&self.texts)
    }

    /// Full raw history in ascending sequence order.
    pub fn history(&self) -> Arc<Vec<HistoryRecord>> {
        Arc::clone(&self.history)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether committed records survive a restart.
    pub fn is_journaled(&self) -> bool {
        self.journal.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Remove every record. Irreversible; truncates the journal.
    pub fn clear(&mut self) -> Result<(), RecordError> {
        if let Some(path) = &self.journal {
            if path.exists() {
                std::fs::write(path, "")
                    .map_err(|e| RecordError::Journal(format!("Failed to truncate journal: {e}")))?;
            }
        }
        self.history = Arc::new(Vec::new());
        self.texts = Arc::new(Vec::new());
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RecordError::Journal(format!("Failed to create journal directory: {e}")))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RecordError::Journal(format!("Failed to open journal: {e}")))?;
    writeln!(file, "{line}").map_err(|e| RecordError::Journal(format!("Failed to write journal: {e}")))
}
