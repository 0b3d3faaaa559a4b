//! Turn domain type.
//!
//! A turn is one recorded utterance: an external participant speaking, the
//! agent replying, or a `system` observation (command results, behavior
//! logs, summaries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The reserved speaker tag for system-generated turns.
pub const SYSTEM_SPEAKER: &str = "system";

/// A single turn in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn: the agent's name, `system`, or a participant
    pub speaker: String,

    /// The text content
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,

    /// Pinned system turns survive history compaction.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anchor: bool,
}

impl Turn {
    /// Create a new turn for the given speaker.
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            speaker: speaker.into(),
            content: content.into(),
            timestamp: Utc::now(),
            anchor: false,
        }
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SPEAKER, content)
    }

    /// Create a system turn that compaction must keep.
    pub fn anchor(content: impl Into<String>) -> Self {
        Self {
            anchor: true,
            ..Self::system(content)
        }
    }

    pub fn is_system(&self) -> bool {
        self.speaker == SYSTEM_SPEAKER
    }
}

/// Render turns as plain text, one `speaker: content` line per turn.
pub fn stringify_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_use_reserved_speaker() {
        let turn = Turn::system("You picked up 3 stone");
        assert!(turn.is_system());
        assert!(!turn.anchor);
    }

    #[test]
    fn anchors_are_system_turns() {
        let turn = Turn::anchor("Goal: build a house");
        assert!(turn.is_system());
        assert!(turn.anchor);
    }

    #[test]
    fn non_anchor_flag_is_not_serialized() {
        let json = serde_json::to_string(&Turn::new("steve", "hi")).unwrap();
        assert!(!json.contains("anchor"));
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert!(!back.anchor);
    }

    #[test]
    fn stringify_joins_lines() {
        let turns = vec![Turn::new("steve", "hello"), Turn::new("andy", "hi!")];
        assert_eq!(stringify_turns(&turns), "steve: hello\nandy: hi!");
    }
}
