//! Summarizer implementations for Lorekeeper.
//!
//! All summarizers implement the `lorekeeper_core::Summarizer` trait.
//! [`build_from_config`] selects one based on configuration.

pub mod extractive;
pub mod openai_compat;
pub mod router;

pub use extractive::ExtractiveSummarizer;
pub use openai_compat::OpenAiCompatSummarizer;
pub use router::build_from_config;
