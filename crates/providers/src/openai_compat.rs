//! OpenAI-compatible summarizer.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/v1/chat/completions`. One non-streaming completion per summarizer call.

use async_trait::async_trait;
use lorekeeper_core::error::SummarizerError;
use lorekeeper_core::summarizer::Summarizer;
use serde::Deserialize;
use tracing::{debug, warn};

const SUMMARIZE_PROMPT: &str = "\
Summarize the following story passages into one concise paragraph. \
Keep names, places, decisions, and unresolved threads. \
Only include facts stated in the passages. Reply with the summary only.";

const MERGE_PROMPT: &str = "\
You maintain a running summary of a long story. Integrate the new passages \
into the existing summary so the result is a single standalone summary that \
replaces the old one. Deduplicate, keep the oldest facts brief, and reply \
with the summary only.";

/// A summarizer backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiCompatSummarizer {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_chars: usize,
    client: reqwest::Client,
}

impl OpenAiCompatSummarizer {
    /// Create a new OpenAI-compatible summarizer.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            max_chars: 1200,
            client,
        }
    }

    /// Create an Ollama summarizer (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new(
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn summarize_body(&self, texts: &[String]) -> serde_json::Value {
        self.body(SUMMARIZE_PROMPT, format_passages(texts))
    }

    fn merge_body(&self, previous: &str, texts: &[String]) -> serde_json::Value {
        let user = format!(
            "=== EXISTING SUMMARY ===\n{}\n\n=== NEW PASSAGES ===\n{}",
            previous.trim(),
            format_passages(texts)
        );
        self.body(MERGE_PROMPT, user)
    }

    fn body(&self, system: &str, user: String) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
            "max_tokens": (self.max_chars / 3).max(64),
            "stream": false,
        })
    }

    async fn complete(&self, body: serde_json::Value) -> Result<String, SummarizerError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "Sending summarization request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SummarizerError::retryable(format!("Network error: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Summarizer endpoint returned error");
            return Err(classify_status(status, &error_body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::permanent(format!("Failed to parse response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(SummarizerError::permanent("Model returned an empty summary"));
        }

        Ok(truncate_chars(&content, self.max_chars))
    }
}

#[async_trait]
impl Summarizer for OpenAiCompatSummarizer {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, SummarizerError> {
        self.complete(self.summarize_body(texts)).await
    }

    async fn merge(&self, previous: &str, texts: &[String]) -> Result<String, SummarizerError> {
        if previous.trim().is_empty() {
            return self.summarize(texts).await;
        }
        self.complete(self.merge_body(previous, texts)).await
    }
}

/// Map an HTTP error status to a summarizer error.
fn classify_status(status: u16, body: &str) -> SummarizerError {
    match status {
        429 => SummarizerError::retryable("Rate limited by summarizer endpoint"),
        401 | 403 => SummarizerError::permanent("Invalid API key or insufficient permissions"),
        500..=599 => SummarizerError::retryable(format!("Server error {status}: {body}")),
        _ => SummarizerError::permanent(format!("Request rejected with {status}: {body}")),
    }
}

fn format_passages(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => text[..i].to_string(),
        None => text.to_string(),
    }
}

// ── API types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_constructor() {
        let s = OpenAiCompatSummarizer::ollama(None, "llama3");
        assert_eq!(s.base_url, "http://localhost:11434/v1");
        assert_eq!(s.model, "llama3");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let s = OpenAiCompatSummarizer::new("https://example.test/v1/", "k", "m");
        assert_eq!(s.base_url, "https://example.test/v1");
    }

    #[test]
    fn summarize_body_numbers_passages() {
        let s = OpenAiCompatSummarizer::new("http://x", "k", "m").with_temperature(0.0);
        let body = s.summarize_body(&["one".into(), "two".into()]);
        assert_eq!(body["model"], "m");
        assert_eq!(body["temperature"], 0.0);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("[1] one"));
        assert!(user.contains("[2] two"));
    }

    #[test]
    fn merge_body_carries_previous_summary() {
        let s = OpenAiCompatSummarizer::new("http://x", "k", "m");
        let body = s.merge_body("Earlier: a duel.", &["A truce.".into()]);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("EXISTING SUMMARY"));
        assert!(user.contains("Earlier: a duel."));
        assert!(user.contains("[1] A truce."));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(429, "").retryable);
        assert!(classify_status(503, "down").retryable);
        assert!(!classify_status(401, "").retryable);
        assert!(!classify_status(400, "bad").retryable);
    }

    #[test]
    fn parse_api_response() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":" Summary. "}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Summary. "));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable() {
        let s = OpenAiCompatSummarizer::new("http://127.0.0.1:9", "k", "m");
        let err = s.summarize(&["text".into()]).await.unwrap_err();
        assert!(err.retryable);
    }
}
