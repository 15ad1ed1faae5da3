//! History and text record domain types.
//!
//! These are the value objects that flow through the whole engine:
//! a raw turn arrives → the record store extracts its main text → the tier
//! calculator partitions text records by recency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a record in the history. Assigned at append time, starting at 0.
pub type Sequence = u64;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    #[default]
    User,
    /// The AI assistant
    Assistant,
    /// System or narrator text
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A turn as handed over by the ingestion path, before it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTurn {
    pub role: Role,
    pub text: String,
}

impl RawTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// One ingested turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sequence: Sequence,
    pub role: Role,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// The extracted narrative payload of a [`HistoryRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub sequence: Sequence,
    pub text: String,
}

impl TextRecord {
    pub fn new(sequence: Sequence, text: impl Into<String>) -> Self {
        Self { sequence, text: text.into() }
    }
}
