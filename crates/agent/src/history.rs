//! Conversation history with summarizing compaction.
//!
//! History is an ordered log of [`Turn`]s. When its JSON form grows past
//! `max_chars`, the oldest run of non-anchor turns is folded into a single
//! system turn written by a [`Memorizer`]. Anchors and the most recent
//! `keep_recent` turns are never folded.

use std::ops::Range;
use async_trait::async_trait;
use blockmind_config::HistoryConfig;
use blockmind_core::error::ProviderError;
use blockmind_core::session::SessionSnapshot;
use blockmind_core::turn::Turn;
use tracing::{debug, info};

/// Writes the summary that replaces a run of old turns.
#[async_trait]
pub trait Memorizer: Send + Sync {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct History {
    agent_name: String,
    turns: Vec<Turn>,
    limits: HistoryConfig,
}

impl History {
    pub fn new(agent_name: impl Into<String>, limits: &HistoryConfig) -> Self {
        Self {
            agent_name: agent_name.into(),
            turns: Vec::new(),
            limits: limits.clone(),
        }
    }

    pub fn add(&mut self, speaker: impl Into<String>, content: impl Into<String>) {
        self.turns.push(Turn::new(speaker, content));
    }

    /// Add a system turn compaction must keep.
    pub fn add_anchor(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::anchor(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn serialized_size(&self) -> usize {
        serialized_size(&self.turns)
    }

    pub fn needs_compaction(&self) -> bool {
        self.serialized_size() > self.limits.max_chars
    }

    /// Fold old turns into summaries until the history fits.
    ///
    /// Returns how many turns were folded. On a memorizer error nothing is
    /// changed.
    pub async fn compact(&mut self, memorizer: &dyn Memorizer) -> Result<usize, ProviderError> {
        if !self.needs_compaction() {
            return Ok(0);
        }

        let mut turns = self.turns.clone();
        let mut folded = 0;

        while serialized_size(&turns) > self.limits.max_chars {
            let Some(run) =
                compactable_run(&turns, self.limits.summary_chunk_size, self.limits.keep_recent)
            else {
                debug!(turns = turns.len(), "Nothing left to compact");
                break;
            };

            let summary = memorizer.summarize(&turns[run.clone()]).await?;
            let summary: String = summary.trim().chars().take(self.limits.max_summary_chars).collect();
            folded += run.len();
            turns.splice(run, [Turn::system(summary)]);
        }

        info!(
            agent = %self.agent_name,
            folded,
            size = serialized_size(&turns),
            "Compacted history"
        );
        self.turns = turns;
        Ok(folded)
    }

    pub fn snapshot(&self, self_prompt: Option<String>) -> SessionSnapshot {
        SessionSnapshot::new(self.agent_name.clone(), self.turns.clone(), self_prompt)
    }

    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        self.turns = snapshot.turns;
    }
}

fn serialized_size(turns: &[Turn]) -> usize {
    serde_json::to_string(turns).map(|s| s.len()).unwrap_or(0)
}

/// The oldest run of at least two non-anchor turns, at most `chunk` long,
/// outside the `keep_recent` tail.
fn compactable_run(turns: &[Turn], chunk: usize, keep_recent: usize) -> Option<Range<usize>> {
    let limit = turns.len().saturating_sub(keep_recent);
    let mut start = 0;

    while start < limit {
        if turns[start].anchor {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < limit && !turns[end].anchor && end - start < chunk {
            end += 1;
        }
        if end - start >= 2 {
            return Some(start..end);
        }
        start = end;
    }
    None
}
