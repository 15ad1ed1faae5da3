//! # Lorekeeper Core
//!
//! Domain types, traits, and error definitions for the Lorekeeper context
//! compaction engine. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates:
//! - [`Summarizer`] in `lorekeeper-providers`
//! - [`StoreAdapter`] in `lorekeeper-memory`
//!
//! The compaction engine in `lorekeeper-compaction` only ever talks to these
//! traits, which keeps it testable with stub collaborators.

pub mod error;
pub mod record;
pub mod tier;
pub mod context;
pub mod summarizer;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, RecordError, Result, StoreAdapterError, SummarizerError};
pub use record::{HistoryRecord, RawTurn, Role, Sequence, TextRecord};
pub use tier::{LargeSummaryTier, SegmentTier, SeqRange, SmallSummaryTier, SummaryPiece, Tiers};
pub use context::{ContextConfig, ContextMode, ContextSettings, ContextState, Statistics};
pub use summarizer::Summarizer;
pub use store::{EntryKey, StoreAdapter, WorldEntry};
pub use event::{ContextEvent, EventBus};
