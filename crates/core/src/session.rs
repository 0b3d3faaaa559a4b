//! Session persistence: durable storage for a resumable agent session.
//!
//! A snapshot holds the conversation history and, when self-prompting was
//! active at save time, its goal text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::SessionError;
use crate::turn::Turn;

/// Everything needed to resume a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The agent this session belongs to
    pub agent_name: String,

    /// Ordered history
    pub turns: Vec<Turn>,

    /// Active self-prompt goal, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_prompt: Option<String>,

    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(agent_name: impl Into<String>, turns: Vec<Turn>, self_prompt: Option<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            turns,
            self_prompt,
            saved_at: Utc::now(),
        }
    }
}

/// Durable storage for session snapshots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The name of this store (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Load the last saved snapshot, if any.
    async fn load(&self) -> Result<Option<SessionSnapshot>, SessionError>;

    /// Persist a snapshot, replacing the previous one.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError>;
}
