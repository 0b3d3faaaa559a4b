//! Blockmind agent: the turn loop.
//!
//! The [`TurnController`] owns the conversation: it records turns, queries
//! the model, runs the commands the model asks for and feeds their results
//! back. [`AgentRuntime`] connects it to a world, a heartbeat and a session
//! store.

pub mod behavior_log;
pub mod context;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod history;
pub mod prompter;
pub mod runtime;
pub mod self_prompter;
pub mod validator;

#[cfg(test)]
mod test_helpers;

pub use behavior_log::BehaviorLog;
pub use context::SessionContext;
pub use controller::TurnController;
pub use error::{AgentError, ShutdownReason};
pub use gateway::{GatewayMemorizer, ModelGateway};
pub use heartbeat::{Beat, Heartbeat};
pub use history::{History, Memorizer};
pub use prompter::Prompter;
pub use runtime::{AgentBuilder, AgentRuntime, Intent};
pub use self_prompter::{SelfPromptState, SelfPrompter, Verdict};
pub use validator::InventoryTargetValidator;
