//! Reconciliation — pushes the desired world book state for a set of keys.
//!
//! Every key is attempted even if an earlier one fails, so a partial failure
//! leaves as many entries current as possible. The caller decides what to
//! retry from the report.

use lorekeeper_core::context::ContextState;
use lorekeeper_core::error::{ContextError, StoreAdapterError};
use lorekeeper_core::store::{EntryKey, StoreAdapter};
use tracing::{debug, warn};

use crate::render::desired_entry;

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub written: Vec<EntryKey>,
    pub deleted: Vec<EntryKey>,
    pub failures: Vec<StoreAdapterError>,
}

impl ReconcileReport {
    /// Keys whose external entry now matches local state.
    pub fn succeeded(&self) -> impl Iterator<Item = EntryKey> + '_ {
        self.written.iter().chain(self.deleted.iter()).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse a failed pass into the error surfaced to callers.
    pub fn into_error(self) -> Option<ContextError> {
        if self.failures.is_empty() {
            return None;
        }
        let succeeded = self.succeeded().collect();
        let retryable = self.failures.iter().all(|f| f.retryable);
        let failed = self.failures.iter().map(|f| f.key).collect();
        let reason = self.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ");
        Some(ContextError::Store { retryable, succeeded, failed, reason })
    }
}

/// Bring the entries under `keys` in line with `state`.
pub async fn reconcile(
    store: &dyn StoreAdapter,
    state: &ContextState,
    keys: &[EntryKey],
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for &key in keys {
        match desired_entry(state, key) {
            Some(entry) => match store.write_entry(entry).await {
                Ok(()) => {
                    debug!(%key, store = store.name(), "Wrote world book entry");
                    report.written.push(key);
                }
                Err(e) => {
                    warn!(%key, error = %e, "World book write failed");
                    report.failures.push(e);
                }
            },
            None => match store.delete_entry(key).await {
                Ok(()) => {
                    debug!(%key, store = store.name(), "Deleted world book entry");
                    report.deleted.push(key);
                }
                Err(e) => {
                    warn!(%key, error = %e, "World book delete failed");
                    report.failures.push(e);
                }
            },
        }
    }

    report
}
