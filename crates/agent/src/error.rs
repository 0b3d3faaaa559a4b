//! Errors raised by the turn loop.

use blockmind_commands::ActionError;
use blockmind_core::error::{ProviderError, SessionError, WorldError};
use thiserror::Error;

/// Why the agent is shutting down for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The task validator reported success
    TaskCompleted,
    /// The world connection ended
    Disconnected(String),
    /// The agent was kicked from the world
    Kicked(String),
    /// An action ignored repeated stop requests
    ActionStuck(String),
}

impl ShutdownReason {
    /// Process exit code for this reason.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::TaskCompleted => 0,
            _ => 1,
        }
    }

    /// The text recorded as the final system turn.
    pub fn message(&self) -> String {
        match self {
            ShutdownReason::TaskCompleted => "task completed".into(),
            ShutdownReason::Disconnected(reason) => {
                format!("Bot disconnected! Killing agent process. ({reason})")
            }
            ShutdownReason::Kicked(reason) => format!("Bot kicked! Killing agent process. ({reason})"),
            ShutdownReason::ActionStuck(label) => {
                format!("Code execution refused stop after 10 seconds. Killing process. ({label})")
            }
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// Not recoverable: the runtime stops and the process exits.
    #[error("Shutting down: {0}")]
    Shutdown(ShutdownReason),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<ActionError> for ShutdownReason {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::StopRefused { label, .. } => ShutdownReason::ActionStuck(label),
        }
    }
}

impl AgentError {
    pub fn shutdown_reason(&self) -> Option<&ShutdownReason> {
        match self {
            AgentError::Shutdown(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_task_completion_exits_cleanly() {
        assert_eq!(ShutdownReason::TaskCompleted.exit_code(), 0);
        assert_eq!(ShutdownReason::Kicked("spam".into()).exit_code(), 1);
        assert_eq!(ShutdownReason::Disconnected("eof".into()).exit_code(), 1);
    }

    #[test]
    fn stuck_action_is_a_shutdown() {
        let reason: ShutdownReason = ActionError::StopRefused {
            label: "action:stay".into(),
            secs: 10,
        }
        .into();
        assert_eq!(reason, ShutdownReason::ActionStuck("action:stay".into()));
        assert!(AgentError::Shutdown(reason).shutdown_reason().is_some());
    }
}
