//! Context state — the single value the sync controller owns and publishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::store::EntryKey;
use crate::tier::Tiers;

/// Upper bound for either tier count; anything larger is almost certainly a typo.
pub const MAX_TIER_COUNT: i64 = 1_000_000;

/// How history is presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Segment + small summary + large summary.
    #[default]
    Segmented,
    /// The whole history verbatim; tiers unused.
    Full,
}

impl std::fmt::Display for ContextMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextMode::Segmented => write!(f, "segmented"),
            ContextMode::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for ContextMode {
    type Err = ContextError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "segmented" | "segment" => Ok(ContextMode::Segmented),
            "full" => Ok(ContextMode::Full),
            other => Err(ContextError::Validation(format!(
                "unknown mode '{other}' (expected 'segmented' or 'full')"
            ))),
        }
    }
}

/// Window sizes for the segment and small summary tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Most recent records kept verbatim (`N`).
    pub segment_count: usize,
    /// Records just older than the segment covered by small summaries (`M`).
    pub small_summary_count: usize,
}

impl ContextConfig {
    pub fn new(segment_count: usize, small_summary_count: usize) -> Self {
        Self { segment_count, small_summary_count }
    }

    /// Validate a user-supplied count and convert it.
    pub fn validate_count(name: &str, value: i64) -> std::result::Result<usize, ContextError> {
        if value < 0 {
            return Err(ContextError::Validation(format!("{name} must be >= 0, got {value}")));
        }
        if value > MAX_TIER_COUNT {
            return Err(ContextError::Validation(format!(
                "{name} must be <= {MAX_TIER_COUNT}, got {value}"
            )));
        }
        Ok(value as usize)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { segment_count: 3, small_summary_count: 25 }
    }
}

/// The persisted part of the state: everything except derived tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSettings {
    pub mode: ContextMode,
    pub enabled: bool,
    pub config: ContextConfig,
}

/// Process-wide context state. Replaced wholesale, never mutated in place
/// once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextState {
    pub mode: ContextMode,
    pub enabled: bool,
    pub config: ContextConfig,
    pub tiers: Tiers,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl ContextState {
    pub fn new(settings: ContextSettings, chunk_size: usize) -> Self {
        Self {
            mode: settings.mode,
            enabled: settings.enabled,
            config: settings.config,
            tiers: Tiers::empty(chunk_size),
            last_update_time: None,
        }
    }

    pub fn settings(&self) -> ContextSettings {
        ContextSettings { mode: self.mode, enabled: self.enabled, config: self.config }
    }
}

/// Read-only counts for observability. Derived on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub record_count: usize,
    pub text_count: usize,
    /// Records kept verbatim in the segment tier.
    pub segment_count: usize,
    /// Records covered by the small summary tier.
    pub small_summary_count: usize,
    /// Records covered by the large summary tier.
    pub large_summary_count: usize,
    pub mode: ContextMode,
    pub enabled: bool,
    pub last_update_time: Option<DateTime<Utc>>,
    /// Keys whose external entry is known to lag the local state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_keys: Vec<EntryKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_count_rejected() {
        let err = ContextConfig::validate_count("segment_count", -1).unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
        assert_eq!(ContextConfig::validate_count("segment_count", 0).unwrap(), 0);
    }

    #[test]
    fn mode_parses() {
        assert_eq!("FULL".parse::<ContextMode>().unwrap(), ContextMode::Full);
        assert!("tiered".parse::<ContextMode>().is_err());
    }

    #[test]
    fn settings_roundtrip_json() {
        let settings = ContextSettings {
            mode: ContextMode::Full,
            enabled: true,
            config: ContextConfig::new(4, 10),
        };
        let json = serde_json::to_value(settings).unwrap();
        assert_eq!(json["mode"], "full");
        let parsed: ContextSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, settings);
    }
}
