//! Domain event system: decoupled observation of the turn loop.
//!
//! The controller publishes events as turns are processed; the CLI and tests
//! subscribe to watch what the agent did without reaching into its state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A message entered the turn controller
    MessageReceived {
        source: String,
        content_preview: String,
        self_prompt: bool,
        timestamp: DateTime<Utc>,
    },

    /// The model gateway produced a completion
    ResponseGenerated {
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A command was dispatched
    CommandExecuted {
        command: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A long-running action finished, was interrupted, or timed out
    ActionFinished {
        label: String,
        interrupted: bool,
        timed_out: bool,
        timestamp: DateTime<Utc>,
    },

    /// The agent spoke into the world
    Spoke {
        to: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Self-prompting started or stopped
    SelfPromptChanged {
        running: bool,
        goal: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// History was compacted into a summary turn
    HistoryCompacted {
        turns_folded: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
