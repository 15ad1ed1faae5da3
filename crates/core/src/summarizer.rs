//! Summarizer trait — the abstraction over text-generation backends that
//! compact older history.
//!
//! Implementations: extractive (deterministic, offline), OpenAI-compatible LLM.

use async_trait::async_trait;

use crate::error::SummarizerError;

/// Produces summaries for the small and large summary tiers.
///
/// Calls may be slow and may fail; the engine treats them as blocking-but-
/// cancellable and never applies partial results.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// The summarizer name (e.g., "extractive", "openai_compat").
    fn name(&self) -> &str;

    /// Summarize an ordered run of texts into one string.
    async fn summarize(&self, texts: &[String]) -> Result<String, SummarizerError>;

    /// Fold new texts into an existing summary.
    async fn merge(&self, previous: &str, texts: &[String]) -> Result<String, SummarizerError>;
}
