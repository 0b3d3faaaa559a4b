//! Command dispatcher: turns a command found in text into an effect.
//!
//! The dispatcher does not own the agent. It drives it through
//! [`AgentHandle`], which the turn controller implements over its own state.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use blockmind_core::error::CommandError;
use blockmind_core::world::{Position, World};
use tracing::{debug, warn};
use crate::actions::{ActionError, ActionManager, ActionOrigin};
use crate::builtins;
use crate::grammar;
use crate::registry::CommandRegistry;

/// What a command may touch on the agent executing it.
#[async_trait]
pub trait AgentHandle: Send {
    fn name(&self) -> &str;

    fn world(&self) -> Arc<dyn World>;

    fn actions(&self) -> &ActionManager;

    /// Origin stamped on actions launched by the command being executed.
    fn action_origin(&self) -> ActionOrigin;

    fn start_self_prompt(&mut self, goal: String);

    /// Stop self-prompting; a non-graceful stop also stops the current action.
    async fn stop_self_prompt(&mut self, graceful: bool) -> Result<(), ActionError>;

    fn self_prompt_active(&self) -> bool;

    /// Stop talking until someone speaks to the agent again.
    fn shut_up(&mut self);

    fn clear_behavior_log(&mut self);

    fn remember_place(&mut self, name: String, position: Position);

    fn saved_place(&self, name: &str) -> Option<Position>;

    fn saved_place_names(&self) -> Vec<String>;
}

/// Parses, validates and runs commands.
pub struct CommandDispatcher {
    registry: CommandRegistry,
    action_timeout: Option<Duration>,
}

impl CommandDispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry,
            action_timeout: None,
        }
    }

    /// Interrupt finite actions that run longer than `timeout`.
    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout
    }

    /// Name of the first command in `text`, if the text contains one.
    pub fn contains_command(&self, text: &str) -> Option<String> {
        grammar::contains_command(text)
    }

    pub fn command_exists(&self, name: &str) -> bool {
        self.registry.exists(name)
    }

    pub fn command_docs(&self) -> String {
        self.registry.docs()
    }

    /// Execute the first command in `text`.
    ///
    /// Returns `Ok(Some(result))` for commands that answer immediately and
    /// `Ok(None)` for commands whose effect is asynchronous or silent.
    pub async fn execute(
        &self,
        agent: &mut dyn AgentHandle,
        text: &str,
    ) -> Result<Option<String>, CommandError> {
        let invocation = grammar::find_command(text)
            .ok_or_else(|| CommandError::NotFound(text.trim().to_string()))?;

        let def = self
            .registry
            .get(&invocation.name)
            .ok_or_else(|| CommandError::NotFound(invocation.name.clone()))?;

        let args = def.bind(&invocation.args)?;

        debug!(agent = %agent.name(), command = %def.name, args = args.len(), "Executing command");

        let result = builtins::run(def, &args, agent, self).await;
        if let Err(e) = &result {
            warn!(command = %def.name, error = %e, "Command failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedWorld, TestAgent};

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(CommandRegistry::builtin(&["!attack"]))
    }

    #[tokio::test]
    async fn query_returns_result() {
        let world = Arc::new(ScriptedWorld::new());
        world.give("oak_log", 4);
        let mut agent = TestAgent::new(world);

        let result = dispatcher().execute(&mut agent, "let me look !inventory").await.unwrap();
        assert_eq!(result.as_deref(), Some("INVENTORY\n- oak_log: 4\n"));
    }

    #[tokio::test]
    async fn unknown_and_blocked_commands_do_not_exist() {
        let mut agent = TestAgent::new(Arc::new(ScriptedWorld::new()));
        let d = dispatcher();

        let err = d.execute(&mut agent, "!fly(10)").await.unwrap_err();
        assert_eq!(err, CommandError::NotFound("!fly".into()));
        assert_eq!(err.to_string(), "Command !fly does not exist.");

        assert!(!d.command_exists("!attack"));
        let err = d.execute(&mut agent, "!attack(\"zombie\")").await.unwrap_err();
        assert_eq!(err, CommandError::NotFound("!attack".into()));
    }

    #[tokio::test]
    async fn bad_arguments_are_reported() {
        let mut agent = TestAgent::new(Arc::new(ScriptedWorld::new()));
        let err = dispatcher()
            .execute(&mut agent, "!collectBlocks(\"stone\")")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidArguments { .. }));
        assert!(err.to_string().contains("was given 1 args, but requires 2 args"));
    }

    #[tokio::test]
    async fn actions_launch_and_return_nothing() {
        let world = Arc::new(ScriptedWorld::new());
        let mut agent = TestAgent::new(world.clone());

        let result = dispatcher()
            .execute(&mut agent, "!collectBlocks(\"stone\", 2)")
            .await
            .unwrap();
        assert!(result.is_none());

        let outcome = agent.outcomes.recv().await.unwrap();
        assert_eq!(outcome.label, "action:collectBlocks");
        assert_eq!(outcome.origin, ActionOrigin::Direct { source: "steve".into() });
        assert_eq!(world.inventory_count("stone"), 2);
    }

    #[tokio::test]
    async fn saved_places_round_trip() {
        let world = Arc::new(ScriptedWorld::new());
        let mut agent = TestAgent::new(world.clone());
        let d = dispatcher();

        let saved = d.execute(&mut agent, "!rememberHere(\"home\")").await.unwrap();
        assert_eq!(saved.as_deref(), Some("Location saved as \"home\"."));

        let listed = d.execute(&mut agent, "!savedPlaces").await.unwrap();
        assert_eq!(listed.as_deref(), Some("Saved place names: home"));

        let err = d.execute(&mut agent, "!goToPlace(\"castle\")").await.unwrap_err();
        assert!(err.to_string().contains("No location named \"castle\""));

        assert!(d.execute(&mut agent, "!goToPlace(\"home\")").await.unwrap().is_none());
        let outcome = agent.outcomes.recv().await.unwrap();
        assert!(!outcome.failed);
    }

    #[tokio::test]
    async fn goal_and_end_goal_drive_self_prompting() {
        let mut agent = TestAgent::new(Arc::new(ScriptedWorld::new()));
        let d = dispatcher();

        let r = d.execute(&mut agent, "!goal(\"build a hut\")").await.unwrap();
        assert!(r.is_none());
        assert_eq!(agent.goal.as_deref(), Some("build a hut"));

        let r = d.execute(&mut agent, "!endGoal").await.unwrap();
        assert_eq!(r.as_deref(), Some("Self-prompting stopped."));
        assert!(agent.goal.is_none());
    }

    #[tokio::test]
    async fn stop_cancels_the_resumable_action() {
        let world = Arc::new(ScriptedWorld::new());
        let mut agent = TestAgent::new(world);
        let d = dispatcher();

        d.execute(&mut agent, "!followPlayer(\"steve\", 3)").await.unwrap();
        assert!(agent.actions().is_executing());

        let r = d.execute(&mut agent, "!stop").await.unwrap();
        assert_eq!(r.as_deref(), Some("Agent stopped."));
        assert!(!agent.actions().is_executing());
        assert!(!agent.actions().has_resume());
    }

    #[tokio::test]
    async fn stfu_mutes_and_speaks_once() {
        let world = Arc::new(ScriptedWorld::new());
        let mut agent = TestAgent::new(world.clone());
        agent.goal = Some("explore".into());

        let r = dispatcher().execute(&mut agent, "!stfu").await.unwrap();
        assert!(r.is_none());
        assert!(agent.muted);
        assert!(agent.goal.is_none());
        assert_eq!(world.chat_log(), vec!["Shutting up.".to_string()]);
    }

    #[test]
    fn docs_exclude_blocked_commands() {
        let docs = dispatcher().command_docs();
        assert!(docs.contains("!goToPlayer"));
        assert!(!docs.contains("!attack"));
    }
}
