//! Error types for the Lorekeeper domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`ContextError`] is the
//! taxonomy reported by engine operations.

use thiserror::Error;

use crate::store::EntryKey;

/// The top-level error type for all Lorekeeper operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Engine errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Summarizer errors ---
    #[error("Summarizer error: {0}")]
    Summarizer(#[from] SummarizerError),

    // --- Store adapter errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreAdapterError),

    // --- Record store errors ---
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure reported by a [`Summarizer`](crate::Summarizer) call.
#[derive(Debug, Clone, Error)]
#[error("{reason} (retryable: {retryable})")]
pub struct SummarizerError {
    pub reason: String,
    pub retryable: bool,
}

impl SummarizerError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: true }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: false }
    }
}

/// Failure of a single [`StoreAdapter`](crate::StoreAdapter) primitive.
#[derive(Debug, Clone, Error)]
#[error("{operation} of {key} failed: {reason}")]
pub struct StoreAdapterError {
    pub operation: &'static str,
    pub key: EntryKey,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Nothing extractable in turn: {0}")]
    Empty(String),

    #[error("Stale staged record: expected sequence {expected}, got {got}")]
    Stale { expected: u64, got: u64 },

    #[error("Journal error: {0}")]
    Journal(String),
}

/// Errors surfaced by compaction engine operations.
///
/// Every variant leaves the engine structurally valid. Only [`ContextError::Store`]
/// implies that local and external state may have diverged.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// Bad input. Nothing local or external was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The summarizer failed; tiers were left unchanged.
    #[error("Summarization failed: {reason} (retryable: {retryable})")]
    Summarization { reason: String, retryable: bool },

    /// Reconciliation failed after local tiers were already updated.
    #[error("Store reconciliation failed for {failed:?} (succeeded: {succeeded:?}): {reason}")]
    Store {
        retryable: bool,
        succeeded: Vec<EntryKey>,
        failed: Vec<EntryKey>,
        reason: String,
    },

    /// A mutation arrived while another one held the guard.
    #[error("Another context operation is in flight")]
    ConcurrencyRejected,

    /// The record store could not persist or accept a record.
    #[error("Record store failure: {0}")]
    Record(String),
}

impl ContextError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ContextError::Validation(_) => false,
            ContextError::Summarization { retryable, .. } => *retryable,
            ContextError::Store { retryable, .. } => *retryable,
            ContextError::ConcurrencyRejected => true,
            ContextError::Record(_) => false,
        }
    }
}

impl From<SummarizerError> for ContextError {
    fn from(e: SummarizerError) -> Self {
        ContextError::Summarization { reason: e.reason, retryable: e.retryable }
    }
}

impl From<RecordError> for ContextError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Empty(_) => ContextError::Validation(e.to_string()),
            other => ContextError::Record(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_lists_keys() {
        let err = ContextError::Store {
            retryable: true,
            succeeded: vec![EntryKey::Segment],
            failed: vec![EntryKey::SmallSummary],
            reason: "disk full".into(),
        };
        let text = err.to_string();
        assert!(text.contains("SmallSummary"));
        assert!(text.contains("disk full"));
        assert!(err.is_retryable());
    }

    #[test]
    fn summarizer_error_converts_with_retry_flag() {
        let err: ContextError = SummarizerError::permanent("model refused").into();
        assert!(matches!(err, ContextError::Summarization { retryable: false, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_record_is_a_validation_error() {
        let err: ContextError = RecordError::Empty("   ".into()).into();
        assert!(matches!(err, ContextError::Validation(_)));
    }
}
