//! # Blockmind Commands
//!
//! The command surface of the agent: the grammar commands are written in,
//! the registry of what exists, the dispatcher that runs them, and the
//! action manager that owns long-running world actions.

pub mod actions;
mod builtins;
pub mod dispatcher;
pub mod grammar;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use actions::{ActionError, ActionManager, ActionOrigin, ActionOutcome, ActionRequest};
pub use builtins::render_inventory;
pub use dispatcher::{AgentHandle, CommandDispatcher};
pub use grammar::{ArgValue, Invocation, contains_command, find_command, split_message, truncate};
pub use registry::{CommandDef, CommandId, CommandKind, CommandRegistry, ParamKind, ParamSpec};
