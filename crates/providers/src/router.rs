//! Summarizer selection — builds the configured summarizer backend.

use std::sync::Arc;

use lorekeeper_config::SummarizerConfig;
use lorekeeper_core::summarizer::Summarizer;
use tracing::info;

use crate::extractive::ExtractiveSummarizer;
use crate::openai_compat::OpenAiCompatSummarizer;

/// Build the summarizer named by `config.provider`.
///
/// `openai_compat` without an API key falls back to the extractive
/// summarizer unless the endpoint is local (Ollama and friends need no key).
pub fn build_from_config(config: &SummarizerConfig) -> Arc<dyn Summarizer> {
    match config.provider.as_str() {
        "openai_compat" => {
            let is_local = config.api_url.contains("localhost") || config.api_url.contains("127.0.0.1");
            match (&config.api_key, is_local) {
                (Some(key), _) => Arc::new(
                    OpenAiCompatSummarizer::new(&config.api_url, key, &config.model)
                        .with_temperature(config.temperature)
                        .with_max_chars(config.max_summary_chars),
                ),
                (None, true) => Arc::new(
                    OpenAiCompatSummarizer::new(&config.api_url, "local", &config.model)
                        .with_temperature(config.temperature)
                        .with_max_chars(config.max_summary_chars),
                ),
                (None, false) => {
                    info!("No summarizer API key configured, using extractive summarizer");
                    Arc::new(ExtractiveSummarizer::new(config.max_summary_chars))
                }
            }
        }
        _ => Arc::new(ExtractiveSummarizer::new(config.max_summary_chars)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_extractive() {
        let s = build_from_config(&SummarizerConfig::default());
        assert_eq!(s.name(), "extractive");
    }

    #[test]
    fn remote_without_key_falls_back() {
        let config = SummarizerConfig {
            provider: "openai_compat".into(),
            api_key: None,
            ..SummarizerConfig::default()
        };
        assert_eq!(build_from_config(&config).name(), "extractive");
    }

    #[test]
    fn keyed_remote_builds_llm_summarizer() {
        let config = SummarizerConfig {
            provider: "openai_compat".into(),
            api_key: Some("sk-test".into()),
            ..SummarizerConfig::default()
        };
        assert_eq!(build_from_config(&config).name(), "openai_compat");
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config = SummarizerConfig {
            provider: "openai_compat".into(),
            api_url: "http://localhost:11434/v1".into(),
            api_key: None,
            ..SummarizerConfig::default()
        };
        assert_eq!(build_from_config(&config).name(), "openai_compat");
    }
}
