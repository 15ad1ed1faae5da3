//! Main-text extraction — turns a raw turn into the text worth compacting.
//!
//! Drops hidden blocks (reasoning traces and any configured tag), optionally
//! narrows to a main-text tag, and normalizes whitespace.

use regex::Regex;

/// Configurable extractor applied to every appended turn.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    strip: Vec<Regex>,
    main: Option<Regex>,
    blank_runs: Regex,
}

impl TextExtractor {
    /// Build an extractor from tag names (without angle brackets).
    pub fn new<S: AsRef<str>>(strip_tags: &[S], main_tag: Option<&str>) -> Result<Self, regex::Error> {
        let strip = strip_tags
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                let tag = regex::escape(t);
                Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>.*?</{tag}>"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let main = match main_tag.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => {
                let tag = regex::escape(t);
                Some(Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>"))?)
            }
            None => None,
        };

        Ok(Self {
            strip,
            main,
            blank_runs: Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+")?,
        })
    }

    /// Extract the main text. Returns `None` if nothing is left.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let mut text = raw.replace("\r\n", "\n");

        for pattern in &self.strip {
            text = pattern.replace_all(&text, "").into_owned();
        }

        if let Some(main) = &self.main {
            let parts: Vec<&str> = main
                .captures_iter(&text)
                .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
                .filter(|s| !s.is_empty())
                .collect();
            if !parts.is_empty() {
                text = parts.join("\n\n");
            }
        }

        let text = self.blank_runs.replace_all(text.trim(), "\n\n").into_owned();
        if text.is_empty() { None } else { Some(text) }
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(&["think", "thinking"], None).expect("Default extraction patterns are valid")
    }
}
