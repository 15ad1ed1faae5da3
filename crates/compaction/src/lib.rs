//! # Lorekeeper Compaction
//!
//! The tiered context compaction engine. Long conversation histories are
//! partitioned into three tiers by recency:
//!
//! - **Segment**: the most recent `N` records, verbatim
//! - **Small summary**: the `M` records before that, summarized per chunk
//! - **Large summary**: everything older, folded into one running summary
//!
//! [`TierCalculator`] computes tiers; [`SyncController`] owns the state,
//! serializes mutations, and mirrors tiers into a world book through a
//! [`StoreAdapter`](lorekeeper_core::StoreAdapter).

pub mod calculator;
pub mod controller;
pub mod reconcile;
pub mod render;
pub mod snapshot;

pub use calculator::{DEFAULT_CHUNK_SIZE, Layout, TierCalculator};
pub use controller::{ControllerOptions, RefreshReport, SyncController};
pub use snapshot::ContextSnapshot;
