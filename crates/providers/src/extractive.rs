//! Extractive summarizer — deterministic, offline, no model required.
//!
//! Keeps the first sentence of every text and clamps the result. Merging
//! appends the new digest to the previous summary and keeps the most recent
//! tail when the cap is exceeded. Same input always yields the same output,
//! which makes it the default for tests and for setups without an API key.

use async_trait::async_trait;
use lorekeeper_core::error::SummarizerError;
use lorekeeper_core::summarizer::Summarizer;

/// Marker placed where text was cut.
const ELLIPSIS: char = '…';

/// Characters kept from a text with no sentence boundary.
const MAX_SENTENCE_CHARS: usize = 200;

pub struct ExtractiveSummarizer {
    max_chars: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars: max_chars.max(16) }
    }

    fn digest(&self, texts: &[String]) -> String {
        texts
            .iter()
            .map(|t| first_sentence(t))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(1200)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, SummarizerError> {
        Ok(clamp_head(&self.digest(texts), self.max_chars))
    }

    async fn merge(&self, previous: &str, texts: &[String]) -> Result<String, SummarizerError> {
        let digest = self.digest(texts);
        let combined = match (previous.trim().is_empty(), digest.is_empty()) {
            (true, _) => digest,
            (false, true) => previous.to_string(),
            (false, false) => format!("{}\n{}", previous.trim_end(), digest),
        };
        Ok(clamp_tail(&combined, self.max_chars))
    }
}

/// Extract the first sentence from text.
fn first_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    for (i, c) in trimmed.char_indices() {
        if matches!(c, '.' | '!' | '?' | '。' | '！' | '？') && i > 0 {
            let end = i + c.len_utf8();
            let next = trimmed[end..].chars().next();
            if next.is_none_or(|n| n.is_whitespace() || !c.is_ascii()) {
                return &trimmed[..end];
            }
        }
    }
    // No sentence boundary found, take a prefix
    let end = trimmed
        .char_indices()
        .nth(MAX_SENTENCE_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Keep the first `max` characters.
fn clamp_head(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// Keep the last `max` characters.
fn clamp_tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let mut out = String::with_capacity(max * 4);
    out.push(ELLIPSIS);
    out.extend(text.chars().skip(count - (max - 1)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_sentence_stops_at_boundary() {
        assert_eq!(first_sentence("Hello there. More text"), "Hello there.");
        assert_eq!(first_sentence("v1.2 is out! Yes."), "v1.2 is out!");
        assert_eq!(first_sentence("她笑了。然后离开"), "她笑了。");
        assert_eq!(first_sentence("no boundary"), "no boundary");
    }

    #[tokio::test]
    async fn summarize_keeps_first_sentences() {
        let s = ExtractiveSummarizer::default();
        let out = s
            .summarize(&texts(&["The knight arrives. He is tired.", "The gate opens! Guards shout."]))
            .await
            .unwrap();
        assert_eq!(out, "The knight arrives. The gate opens!");
    }

    #[tokio::test]
    async fn summarize_is_deterministic() {
        let s = ExtractiveSummarizer::new(40);
        let input = texts(&["A long first sentence that goes on and on and on. Tail."]);
        let a = s.summarize(&input).await.unwrap();
        let b = s.summarize(&input).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.chars().count(), 40);
        assert!(a.ends_with(ELLIPSIS));
    }

    #[tokio::test]
    async fn merge_appends_and_keeps_tail() {
        let s = ExtractiveSummarizer::new(30);
        let merged = s.merge("Old events happened.", &texts(&["New thing. Detail."])).await.unwrap();
        assert!(merged.ends_with("New thing."));
        assert!(merged.chars().count() <= 30);
    }

    #[tokio::test]
    async fn merge_into_empty_is_summary() {
        let s = ExtractiveSummarizer::default();
        let input = texts(&["Only this. Not this."]);
        assert_eq!(s.merge("", &input).await.unwrap(), s.summarize(&input).await.unwrap());
    }
}
