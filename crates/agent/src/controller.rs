//! Turn controller: the agent's single thread of control.
//!
//! Every stimulus (a message, a finished action, a heartbeat, an idle or
//! death signal) reaches the agent through one of the methods here, and the
//! runtime calls them one at a time. History, the self-prompter and the
//! behavior log are therefore only ever touched from one place.
//!
//! A message runs through a bounded loop:
//!
//! 1. query the model with the full history
//! 2. a reply without a command is recorded, spoken, and ends the loop
//! 3. a reply with a command is cut after the command, recorded and
//!    announced; the command runs and its result feeds the next query
//! 4. a command with no immediate result (a launched action) ends the loop;
//!    the action reports back later through [`TurnController::handle_action_outcome`]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use blockmind_commands::{
    ActionError, ActionManager, ActionOrigin, ActionOutcome, AgentHandle, CommandDispatcher, CommandKind,
    CommandRegistry, split_message, truncate,
};
use blockmind_config::AppConfig;
use blockmind_core::event::{DomainEvent, EventBus};
use blockmind_core::provider::Provider;
use blockmind_core::session::{SessionSnapshot, SessionStore};
use blockmind_core::turn::SYSTEM_SPEAKER;
use blockmind_core::validator::TaskValidator;
use blockmind_core::world::{Position, World};
use blockmind_session::InMemorySessionStore;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use crate::behavior_log::BehaviorLog;
use crate::context::SessionContext;
use crate::error::{AgentError, ShutdownReason};
use crate::gateway::{GatewayMemorizer, ModelGateway};
use crate::history::History;
use crate::prompter::Prompter;
use crate::self_prompter::{SelfPrompter, Verdict};

pub struct TurnController {
    name: String,
    world: Arc<dyn World>,
    gateway: ModelGateway,
    prompter: Prompter,
    dispatcher: Arc<CommandDispatcher>,
    actions: ActionManager,
    history: History,
    self_prompter: SelfPrompter,
    behavior_log: BehaviorLog,
    context: Arc<SessionContext>,
    store: Arc<dyn SessionStore>,
    validator: Option<Arc<dyn TaskValidator>>,
    events: Arc<EventBus>,
    places: BTreeMap<String, Position>,
    /// Other autonomous agents; they are talked to in public chat
    peers: Vec<String>,
    turn_budget: Option<u32>,
    max_hallucinations: u32,
    verbose_commands: bool,
    /// Origin stamped on actions launched by the command being run
    origin: ActionOrigin,
}

impl TurnController {
    /// Build a controller and the channel its action outcomes arrive on.
    pub fn new(
        config: &AppConfig,
        world: Arc<dyn World>,
        provider: Arc<dyn Provider>,
    ) -> (Self, mpsc::Receiver<ActionOutcome>) {
        let name = config.profile.name.clone();
        let action_timeout = match config.agent.action_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let dispatcher = CommandDispatcher::new(CommandRegistry::builtin(&config.blocked_commands()))
            .with_action_timeout(action_timeout);
        let prompter = Prompter::new(config.profile.clone(), dispatcher.command_docs());
        let (actions, outcomes) = ActionManager::new(world.clone());

        let controller = Self {
            history: History::new(&name, &config.history),
            name,
            world,
            gateway: ModelGateway::from_config(provider, config),
            prompter,
            dispatcher: Arc::new(dispatcher),
            actions,
            self_prompter: SelfPrompter::new(&config.self_prompt),
            behavior_log: BehaviorLog::new(config.agent.behavior_log_max_chars),
            context: Arc::new(SessionContext::new()),
            store: Arc::new(InMemorySessionStore::new()),
            validator: None,
            events: Arc::new(EventBus::default()),
            places: BTreeMap::new(),
            peers: config.profile.peers.clone(),
            turn_budget: config.agent.turn_budget(),
            max_hallucinations: config.agent.max_hallucinations,
            verbose_commands: config.agent.verbose_commands,
            origin: ActionOrigin::SelfPrompt,
        };
        (controller, outcomes)
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_validator(mut self, validator: Option<Arc<dyn TaskValidator>>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.gateway = self.gateway.with_events(events.clone());
        self.events = events;
        self
    }

    pub fn with_context(mut self, context: Arc<SessionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn self_prompter(&self) -> &SelfPrompter {
        &self.self_prompter
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn is_peer(&self, name: &str) -> bool {
        self.peers.iter().any(|p| p == name)
    }

    // ── Stimuli ───────────────────────────────────────────────────────────

    /// Handle a message from `source`. Returns whether a command was used.
    ///
    /// `max_turns` overrides the configured turn budget.
    pub async fn handle_message(
        &mut self,
        source: &str,
        message: &str,
        max_turns: Option<u32>,
    ) -> Result<bool, AgentError> {
        self.process(source, source, message, max_turns, false).await
    }

    /// Feed a finished action back into the conversation.
    pub async fn handle_action_outcome(&mut self, outcome: ActionOutcome) -> Result<(), AgentError> {
        self.events.publish(DomainEvent::ActionFinished {
            label: outcome.label.clone(),
            interrupted: outcome.interrupted,
            timed_out: outcome.timed_out,
            timestamp: Utc::now(),
        });

        let summary = outcome.summary();
        if summary.is_empty() {
            debug!(label = %outcome.label, "Action ended without output");
            return Ok(());
        }

        match outcome.origin {
            ActionOrigin::Direct { source } => {
                self.history.add(SYSTEM_SPEAKER, &summary);
                self.speak(&source, &summary).await?;
                self.save().await;
            }
            ActionOrigin::Model { source, remaining_turns } => {
                if self.actions.is_executing() || remaining_turns == Some(0) {
                    self.history.add(SYSTEM_SPEAKER, &summary);
                    self.save().await;
                } else {
                    self.process(SYSTEM_SPEAKER, &source, &summary, remaining_turns, false)
                        .await?;
                }
            }
            // left in history for the next self-prompt turn
            ActionOrigin::SelfPrompt | ActionOrigin::Resumed => {
                self.history.add(SYSTEM_SPEAKER, &summary);
            }
        }
        Ok(())
    }

    /// Heartbeat: record ambient observations and run a self-prompt turn
    /// when one is due.
    pub async fn tick(&mut self, delta: Duration, observations: Vec<String>) -> Result<(), AgentError> {
        for observation in &observations {
            self.behavior_log.push(observation);
        }

        let idle = !self.actions.is_executing();
        let Some(goal) = self.self_prompter.poll(delta, idle) else {
            return Ok(());
        };

        let message = self.prompter.self_prompt_message(&goal);
        let result = self
            .process(SYSTEM_SPEAKER, SYSTEM_SPEAKER, &message, None, true)
            .await;

        if let Verdict::Stop { message } = self.self_prompter.record_turn(matches!(result, Ok(true))) {
            self.world.chat(&message).await?;
            self.publish_self_prompt();
        }
        result.map(|_| ())
    }

    /// The agent went idle: check the task and resume a paused action.
    pub async fn on_idle(&mut self) -> Result<(), AgentError> {
        self.check_task().await?;
        self.world.reset_controls().await?;
        if let Err(e) = self.actions.resume_action(self.self_prompter.is_active()).await {
            return Err(self.shutdown(e.into()).await);
        }
        Ok(())
    }

    /// The agent died. Actions were already stopped by the event pump.
    pub async fn on_death(&mut self, message: &str) -> Result<bool, AgentError> {
        let position = self.world.position().await.ok();
        if let Some(position) = position {
            self.places.insert("last_death_position".into(), position);
        }
        let at = position.map(|p| p.to_string()).unwrap_or_else(|| "unknown".into());
        let report = format!(
            "You died at position {at} with the final message: '{message}'. Your place of death is saved as \
'last_death_position' if you want to return. Previous actions were stopped and you have respawned."
        );
        self.handle_message(SYSTEM_SPEAKER, &report, None).await
    }

    /// Load a saved session. Returns the self-prompt goal it was pursuing.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Option<String> {
        info!(agent = %self.name, turns = snapshot.turns.len(), "Restoring session");
        let goal = snapshot.self_prompt.clone();
        self.history.restore(snapshot);
        goal
    }

    /// Pick a restored goal back up.
    pub fn resume_goal(&mut self, goal: &str) {
        self.history.add_anchor(goal);
        self.self_prompter.start(goal);
        self.publish_self_prompt();
    }

    /// Record `reason` as the final turn, say goodbye and save.
    ///
    /// Returns the error that ends the runtime.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> AgentError {
        info!(agent = %self.name, reason = %reason, "Shutting down");

        if reason == ShutdownReason::TaskCompleted {
            let mut lines = vec!["Task completed!".to_string(), "/clear @p".to_string()];
            lines.extend(self.peers.iter().map(|peer| format!("/kick {peer}")));
            for line in lines {
                if let Err(e) = self.world.chat(&line).await {
                    warn!(error = %e, "Could not announce completion");
                }
            }
        }

        self.history.add(SYSTEM_SPEAKER, reason.message());
        if let Err(e) = self.world.chat("Restarting.").await {
            debug!(error = %e, "World already gone");
        }
        self.save().await;
        AgentError::Shutdown(reason)
    }

    /// Compact history if needed and persist it with the current goal.
    pub async fn save(&mut self) {
        if self.history.needs_compaction() {
            let memorizer = GatewayMemorizer {
                gateway: &self.gateway,
                prompter: &self.prompter,
            };
            match self.history.compact(&memorizer).await {
                Ok(folded) => self.events.publish(DomainEvent::HistoryCompacted {
                    turns_folded: folded,
                    timestamp: Utc::now(),
                }),
                Err(e) => warn!(error = %e, "History compaction failed, keeping full history"),
            }
        }

        let snapshot = self.history.snapshot(self.self_prompter.goal().map(String::from));
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(store = self.store.name(), error = %e, "Failed to save session");
            self.events.publish(DomainEvent::ErrorOccurred {
                context: "session_save".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    // ── The turn loop ─────────────────────────────────────────────────────

    /// Run the turn loop for a message recorded under `speaker`, replying
    /// to `reply_to`.
    async fn process(
        &mut self,
        speaker: &str,
        reply_to: &str,
        message: &str,
        max_turns: Option<u32>,
        self_prompt_turn: bool,
    ) -> Result<bool, AgentError> {
        self.check_task().await?;

        let internal = speaker == SYSTEM_SPEAKER || speaker == self.name;
        let from_peer = self.is_peer(speaker);

        self.events.publish(DomainEvent::MessageReceived {
            source: speaker.to_string(),
            content_preview: message.chars().take(80).collect(),
            self_prompt: self_prompt_turn,
            timestamp: Utc::now(),
        });

        if !internal && !from_peer {
            if let Some(name) = self.dispatcher.contains_command(message) {
                return self.direct_command(speaker, message, &name).await;
            }
        }

        if let Some(log) = self.behavior_log.flush() {
            self.history.add(SYSTEM_SPEAKER, log);
        }
        self.history.add(speaker, message);
        self.save().await;

        let mut budget = max_turns.or(self.turn_budget);
        if !internal && self.self_prompter.is_active() {
            // answer the user once, then let self-prompting carry on
            budget = Some(1);
        }

        let mut used_command = false;
        let mut turn = 0u32;
        let mut hallucinations = 0u32;

        while budget.is_none_or(|b| turn < b) {
            if self.interrupted(internal) {
                debug!(agent = %self.name, iteration = turn, "Turn loop interrupted");
                break;
            }

            let system = self.prompter.conversing(self.world.as_ref(), self.self_prompter.goal()).await?;
            let response = match self.gateway.send_request(self.history.turns(), &system).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(agent = %self.name, error = %e, "Model request failed");
                    self.speak(reply_to, &format!("Error: {e}")).await?;
                    break;
                }
            };
            turn += 1;

            let Some(command) = self.dispatcher.contains_command(&response) else {
                debug!(agent = %self.name, "Purely conversational response");
                self.history.add(self.name.clone(), &response);
                self.speak(reply_to, &response).await?;
                break;
            };

            let response = truncate(&response).to_string();
            self.history.add(self.name.clone(), &response);

            if !self.dispatcher.command_exists(&command) {
                warn!(agent = %self.name, command = %command, "Model used a command that does not exist");
                self.history.add(SYSTEM_SPEAKER, format!("Command {command} does not exist."));
                hallucinations += 1;
                if hallucinations >= self.max_hallucinations {
                    warn!(agent = %self.name, hallucinations, "Giving up on this message");
                    self.history.add(
                        SYSTEM_SPEAKER,
                        format!("Stopped after {hallucinations} nonexistent commands in a row."),
                    );
                    break;
                }
                continue;
            }
            hallucinations = 0;

            if self.interrupted(internal) {
                break;
            }
            if !self_prompt_turn && self.is_action(&command) {
                self.self_prompter.pause_for_user_action();
            }

            self.announce(reply_to, &response, &command).await?;

            let origin = if self_prompt_turn {
                ActionOrigin::SelfPrompt
            } else {
                ActionOrigin::Model {
                    source: reply_to.to_string(),
                    remaining_turns: budget.map(|b| b.saturating_sub(turn)),
                }
            };
            let result = self.run_command(&response, origin).await?;
            used_command = true;
            debug!(agent = %self.name, command = %command, has_result = result.is_some(), "Command executed");

            match result {
                Some(result) => self.history.add(SYSTEM_SPEAKER, result),
                None => break,
            }
            self.save().await;
        }

        self.save().await;
        Ok(used_command)
    }

    /// A participant typed a command: run it without asking the model.
    async fn direct_command(&mut self, source: &str, message: &str, name: &str) -> Result<bool, AgentError> {
        if !self.dispatcher.command_exists(name) {
            self.world.chat(&format!("Command '{name}' does not exist.")).await?;
            return Ok(false);
        }

        info!(agent = %self.name, source, command = name, "Running user command");
        self.world
            .chat(&format!("*{source} used {}*", name.trim_start_matches('!')))
            .await?;
        self.history.add(source, message);

        let origin = ActionOrigin::Direct {
            source: source.to_string(),
        };
        if let Some(result) = self.run_command(message, origin).await? {
            self.history.add(SYSTEM_SPEAKER, &result);
            self.speak(source, &result).await?;
        }
        self.save().await;
        Ok(true)
    }

    async fn run_command(&mut self, text: &str, origin: ActionOrigin) -> Result<Option<String>, AgentError> {
        self.origin = origin;
        let dispatcher = self.dispatcher.clone();
        let result = dispatcher.execute(self, text).await;

        self.events.publish(DomainEvent::CommandExecuted {
            command: dispatcher.contains_command(text).unwrap_or_default(),
            success: result.is_ok(),
            timestamp: Utc::now(),
        });

        if let Some(label) = self.actions.refused_stop() {
            return Err(self.shutdown(ShutdownReason::ActionStuck(label)).await);
        }

        Ok(match result {
            Ok(output) => output,
            Err(e) => Some(e.to_string()),
        })
    }

    async fn announce(&mut self, to: &str, response: &str, command: &str) -> Result<(), AgentError> {
        if self.verbose_commands {
            return self.speak(to, response).await;
        }
        let pre = split_message(response).map(|(pre, _)| pre).unwrap_or_default();
        let used = format!("*used {}*", command.trim_start_matches('!'));
        let line = if pre.is_empty() { used } else { format!("{pre}  {used}") };
        self.speak(to, &line).await
    }

    /// Say `message` to `to`: whispered to external participants, public
    /// otherwise. Newlines become spaces.
    async fn speak(&mut self, to: &str, message: &str) -> Result<(), AgentError> {
        let message = message.replace('\n', " ");
        let public = to == SYSTEM_SPEAKER || to == self.name || self.is_peer(to);
        if public {
            self.world.chat(&message).await?;
        } else {
            self.world.whisper(to, &message).await?;
        }
        self.events.publish(DomainEvent::Spoke {
            to: (!public).then(|| to.to_string()),
            message,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn interrupted(&self, internal: bool) -> bool {
        self.self_prompter
            .should_interrupt(internal, self.context.external_pending())
            || self.context.is_shut_up()
    }

    fn is_action(&self, command: &str) -> bool {
        self.dispatcher
            .registry()
            .get(command)
            .is_some_and(|def| def.kind == CommandKind::Action)
    }

    async fn check_task(&mut self) -> Result<(), AgentError> {
        let done = match &self.validator {
            Some(validator) => validator.validate().await,
            None => false,
        };
        if done {
            return Err(self.shutdown(ShutdownReason::TaskCompleted).await);
        }
        Ok(())
    }

    fn publish_self_prompt(&self) {
        self.events.publish(DomainEvent::SelfPromptChanged {
            running: self.self_prompter.is_active(),
            goal: self.self_prompter.goal().map(String::from),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl AgentHandle for TurnController {
    fn name(&self) -> &str {
        &self.name
    }

    fn world(&self) -> Arc<dyn World> {
        self.world.clone()
    }

    fn actions(&self) -> &ActionManager {
        &self.actions
    }

    fn action_origin(&self) -> ActionOrigin {
        self.origin.clone()
    }

    fn start_self_prompt(&mut self, goal: String) {
        self.self_prompter.start(goal);
        self.publish_self_prompt();
    }

    async fn stop_self_prompt(&mut self, graceful: bool) -> Result<(), ActionError> {
        self.self_prompter.stop(graceful, &self.actions).await?;
        self.publish_self_prompt();
        Ok(())
    }

    fn self_prompt_active(&self) -> bool {
        self.self_prompter.is_active()
    }

    fn shut_up(&mut self) {
        self.context.set_shut_up(true);
    }

    fn clear_behavior_log(&mut self) {
        self.behavior_log.clear();
    }

    fn remember_place(&mut self, name: String, position: Position) {
        self.places.insert(name, position);
    }

    fn saved_place(&self, name: &str) -> Option<Position> {
        self.places.get(name).copied()
    }

    fn saved_place_names(&self) -> Vec<String> {
        self.places.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockmind_config::{TaskConfig, TaskKind};
    use blockmind_core::error::ProviderError;
    use blockmind_world::SimWorld;
    use std::collections::HashMap;
    use crate::test_helpers::SequentialMockProvider;
    use crate::validator::InventoryTargetValidator;

    struct Harness {
        controller: TurnController,
        outcomes: mpsc::Receiver<ActionOutcome>,
        world: Arc<SimWorld>,
        provider: Arc<SequentialMockProvider>,
        store: Arc<InMemorySessionStore>,
    }

    fn harness_with(config: AppConfig, provider: SequentialMockProvider) -> Harness {
        let world = Arc::new(
            SimWorld::new(&config.profile.name)
                .with_echo(false)
                .with_step(Duration::from_millis(1))
                .with_player("steve", Position::new(5.0, 64.0, 5.0)),
        );
        let provider = Arc::new(provider);
        let store = Arc::new(InMemorySessionStore::new());
        let (controller, outcomes) = TurnController::new(&config, world.clone(), provider.clone());
        let controller = controller.with_store(store.clone());
        Harness {
            controller,
            outcomes,
            world,
            provider,
            store,
        }
    }

    fn harness(replies: &[&str]) -> Harness {
        harness_with(AppConfig::default(), SequentialMockProvider::texts(replies))
    }

    fn contents(controller: &TurnController) -> Vec<(String, String)> {
        controller
            .history()
            .turns()
            .iter()
            .map(|t| (t.speaker.clone(), t.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn plain_reply_is_recorded_and_spoken_once() {
        let mut h = harness(&["Hi steve!\nNice day."]);

        let used = h.controller.handle_message("steve", "hello", None).await.unwrap();

        assert!(!used);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(
            contents(&h.controller),
            vec![
                ("steve".to_string(), "hello".to_string()),
                ("andy".to_string(), "Hi steve!\nNice day.".to_string()),
            ]
        );
        assert_eq!(h.world.whispers(), vec![("steve".to_string(), "Hi steve! Nice day.".to_string())]);
        assert!(h.store.save_count().await >= 1);
    }

    #[tokio::test]
    async fn user_command_bypasses_the_model() {
        let mut h = harness(&[]);

        let used = h.controller.handle_message("steve", "!goTo(0,70,0)", None).await.unwrap();
        assert!(used);
        assert_eq!(h.provider.call_count(), 0);
        assert!(h.world.chat_log().contains(&"*steve used goTo*".to_string()));

        let outcome = h.outcomes.recv().await.unwrap();
        assert_eq!(outcome.origin, ActionOrigin::Direct { source: "steve".into() });
        h.controller.handle_action_outcome(outcome).await.unwrap();

        let last = h.controller.history().turns().last().unwrap();
        assert!(last.is_system());
        assert!(last.content.starts_with("Action output:\nReached"));
        assert_eq!(h.world.whispers().len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_command_aborts() {
        let mut h = harness(&[]);
        let used = h.controller.handle_message("steve", "!fly(3)", None).await.unwrap();

        assert!(!used);
        assert!(h.controller.history().is_empty());
        assert_eq!(h.world.chat_log(), vec!["Command '!fly' does not exist.".to_string()]);
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn text_after_the_command_is_discarded() {
        let mut h = harness(&["Sure, mining now ```!collectBlocks(\"stone\",5)``` then extra text"]);

        let used = h.controller.handle_message("steve", "get stone", None).await.unwrap();
        assert!(used);
        assert_eq!(h.provider.call_count(), 1);

        let turns = contents(&h.controller);
        assert_eq!(turns[1].1, "Sure, mining now ```!collectBlocks(\"stone\",5)");
        assert_eq!(
            h.world.whispers(),
            vec![("steve".to_string(), "Sure, mining now  *used collectBlocks*".to_string())]
        );

        let outcome = h.outcomes.recv().await.unwrap();
        assert_eq!(outcome.output, "Collected 5 stone.");
        assert_eq!(
            outcome.origin,
            ActionOrigin::Model {
                source: "steve".into(),
                remaining_turns: None
            }
        );
    }

    #[tokio::test]
    async fn action_outcome_reenters_the_loop() {
        let mut h = harness(&["!collectBlocks(\"stone\", 2)", "Got the stone!"]);
        h.controller.handle_message("steve", "get stone", None).await.unwrap();

        let outcome = h.outcomes.recv().await.unwrap();
        h.controller.handle_action_outcome(outcome).await.unwrap();

        assert_eq!(h.provider.call_count(), 2);
        let turns = contents(&h.controller);
        assert!(turns.contains(&(SYSTEM_SPEAKER.to_string(), "Action output:\nCollected 2 stone.".to_string())));
        assert_eq!(turns.last().unwrap().1, "Got the stone!");
        assert_eq!(h.world.whispers().last().unwrap().1, "Got the stone!");
    }

    #[tokio::test]
    async fn hallucinated_command_is_reported_and_the_loop_continues() {
        let mut h = harness(&["!fly", "I can't fly, sorry."]);

        let used = h.controller.handle_message("steve", "fly!", None).await.unwrap();

        assert!(!used);
        assert_eq!(h.provider.call_count(), 2);
        let turns = contents(&h.controller);
        assert!(turns.contains(&(SYSTEM_SPEAKER.to_string(), "Command !fly does not exist.".to_string())));
        assert_eq!(turns.last().unwrap().1, "I can't fly, sorry.");
    }

    #[tokio::test]
    async fn repeated_nonexistent_commands_end_an_unbounded_loop() {
        let mut h = harness(&["!fly"; 20]);
        assert_eq!(h.controller.turn_budget, None);

        let used = h.controller.handle_message("steve", "fly!", None).await.unwrap();

        assert!(!used);
        assert_eq!(h.provider.call_count(), 3);
        let turns = contents(&h.controller);
        assert_eq!(turns.len(), 1 + 3 * 2 + 1);
        assert_eq!(
            turns.last().unwrap(),
            &(SYSTEM_SPEAKER.to_string(), "Stopped after 3 nonexistent commands in a row.".to_string())
        );
    }

    #[tokio::test]
    async fn a_real_command_resets_the_hallucination_count() {
        let mut h = harness(&["!fly", "!stats", "!fly", "!fly", "Never mind."]);

        let used = h.controller.handle_message("steve", "fly!", None).await.unwrap();

        assert!(used);
        assert_eq!(h.provider.call_count(), 5);
        assert_eq!(contents(&h.controller).last().unwrap().1, "Never mind.");
    }

    #[tokio::test]
    async fn self_prompt_turn_of_nonexistent_commands_is_bounded() {
        let mut h = harness(&["!fly"; 20]);
        h.controller.start_self_prompt("reach the clouds".into());

        h.controller.tick(Duration::from_secs(3), vec![]).await.unwrap();

        assert_eq!(h.provider.call_count(), 3);
        assert!(h.controller.self_prompter().is_active());
    }

    #[tokio::test]
    async fn query_results_feed_the_next_request() {
        let mut h = harness(&["Let me look. !inventory", "I have nothing."]);

        let used = h.controller.handle_message("steve", "what do you have?", None).await.unwrap();

        assert!(used);
        let turns = contents(&h.controller);
        assert!(turns.contains(&(SYSTEM_SPEAKER.to_string(), "INVENTORY: none\n".to_string())));
        let request = h.provider.last_request().unwrap();
        assert!(request.messages.iter().any(|m| m.content == "INVENTORY: none\n"));
        assert_eq!(
            h.world.whispers(),
            vec![
                ("steve".to_string(), "Let me look.  *used inventory*".to_string()),
                ("steve".to_string(), "I have nothing.".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn turn_budget_bounds_the_loop() {
        let mut config = AppConfig::default();
        config.agent.max_commands = 2;
        let mut h = harness_with(config, SequentialMockProvider::texts(&["!stats", "!stats", "!stats"]));

        h.controller.handle_message("steve", "status?", None).await.unwrap();
        assert_eq!(h.provider.call_count(), 2);

        // explicit budget wins
        h.controller.handle_message("steve", "again", Some(1)).await.unwrap();
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn gateway_failure_is_spoken_without_a_partial_turn() {
        let mut h = harness_with(
            AppConfig::default(),
            SequentialMockProvider::new(vec![
                Err(ProviderError::Network("reset".into())),
                Err(ProviderError::Network("reset".into())),
            ]),
        );

        let used = h.controller.handle_message("steve", "hello", None).await.unwrap();

        assert!(!used);
        assert_eq!(h.controller.history().len(), 1);
        let (to, said) = h.world.whispers().pop().unwrap();
        assert_eq!(to, "steve");
        assert!(said.starts_with("Error: Network error: reset"));
    }

    #[tokio::test]
    async fn completed_task_shuts_down_before_processing() {
        let mut config = AppConfig::default();
        config.profile.peers = vec!["jill".into()];
        config.task = Some(TaskConfig {
            kind: TaskKind::Harvest,
            target: Some("stick".into()),
            number_of_target: 1,
            initial_inventory: HashMap::new(),
            agent_names: vec!["andy".into(), "jill".into()],
            blocked_actions: HashMap::new(),
        });
        let mut h = harness_with(config.clone(), SequentialMockProvider::texts(&[]));
        let validator = InventoryTargetValidator::from_task(config.task.as_ref().unwrap(), h.world.clone());
        h.controller = h
            .controller
            .with_validator(validator.map(|v| Arc::new(v) as Arc<dyn TaskValidator>));

        h.world.chat("/give andy stick 1").await.unwrap();
        let err = h.controller.handle_message("steve", "hello", None).await.unwrap_err();

        assert_eq!(err.shutdown_reason(), Some(&ShutdownReason::TaskCompleted));
        assert_eq!(h.provider.call_count(), 0);
        let chat = h.world.chat_log();
        assert_eq!(
            &chat[1..],
            &["Task completed!", "/clear @p", "/kick jill", "Restarting."].map(String::from)
        );
        let saved = h.store.latest().await.unwrap();
        assert_eq!(saved.turns.last().unwrap().content, "task completed");
    }

    #[tokio::test]
    async fn user_interjection_while_self_prompting_gets_one_turn() {
        let mut h = harness(&["!stats", "!stats"]);
        h.controller.start_self_prompt("collect wood".into());

        h.controller.handle_message("steve", "how are you?", None).await.unwrap();
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn self_prompting_stops_after_unproductive_turns() {
        let mut h = harness(&["thinking...", "still thinking...", "hmm..."]);
        h.controller.start_self_prompt("collect wood".into());

        for _ in 0..3 {
            h.controller.tick(Duration::from_secs(3), vec![]).await.unwrap();
        }

        assert!(!h.controller.self_prompter().is_active());
        assert_eq!(
            h.world.chat_log().last().unwrap(),
            "Agent did not use command in the last 3 auto-prompts. Stopping auto-prompting."
        );
        // self-prompt turns are spoken publicly
        assert!(h.world.chat_log().contains(&"thinking...".to_string()));
    }

    #[tokio::test]
    async fn observations_reach_history_before_the_next_message() {
        let mut h = harness(&["Yes, I'm hungry."]);
        h.controller
            .tick(Duration::from_millis(300), vec!["Getting hungry.".into()])
            .await
            .unwrap();

        h.controller.handle_message("steve", "hungry?", None).await.unwrap();
        let turns = contents(&h.controller);
        assert_eq!(turns[0], (SYSTEM_SPEAKER.to_string(), "Recent behaviors log: \nGetting hungry.\n".to_string()));
    }

    #[tokio::test]
    async fn shut_up_flag_stops_the_loop() {
        let mut h = harness(&["hello"]);
        h.controller.context().set_shut_up(true);

        h.controller.handle_message("steve", "hi", None).await.unwrap();
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.controller.history().len(), 1);
    }

    #[tokio::test]
    async fn death_is_reported_and_its_place_remembered() {
        let mut h = harness(&["Oops, I died."]);

        h.controller.on_death("andy was slain by zombie").await.unwrap();

        assert!(h.controller.saved_place("last_death_position").is_some());
        let first = &h.controller.history().turns()[0];
        assert!(first.is_system());
        assert!(first.content.starts_with("You died at position x: 0.00, y: 64.00, z: 0.00"));
        assert!(first.content.contains("'andy was slain by zombie'"));
        assert_eq!(h.world.chat_log(), vec!["Oops, I died.".to_string()]);
    }

    #[tokio::test]
    async fn restored_goal_is_anchored_and_resumed() {
        let mut h = harness(&[]);
        let snapshot = SessionSnapshot::new("andy", vec![], Some("build a hut".into()));

        let goal = h.controller.restore(snapshot).unwrap();
        h.controller.resume_goal(&goal);

        assert!(h.controller.self_prompter().is_active());
        assert!(h.controller.history().turns()[0].anchor);

        h.controller.save().await;
        assert_eq!(h.store.latest().await.unwrap().self_prompt.as_deref(), Some("build a hut"));
    }

    #[tokio::test]
    async fn idle_resumes_a_followed_player() {
        let mut h = harness(&[]);
        h.controller
            .handle_message("steve", "!followPlayer(\"steve\", 3)", None)
            .await
            .unwrap();
        h.controller.actions().stop().await.unwrap();
        let _ = h.outcomes.recv().await;
        assert!(!h.controller.actions().is_executing());

        h.controller.on_idle().await.unwrap();
        assert!(h.controller.actions().is_executing());
        h.controller.actions().cancel_resume();
        h.controller.actions().stop().await.unwrap();
    }

    #[tokio::test]
    async fn turns_are_observable_on_the_event_bus() {
        let h = harness(&["hello there"]);
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let mut controller = h.controller.with_events(events);

        controller.handle_message("steve", "hi", None).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(match event.as_ref() {
                DomainEvent::MessageReceived { .. } => "received",
                DomainEvent::ResponseGenerated { .. } => "response",
                DomainEvent::Spoke { to, .. } => {
                    assert_eq!(to.as_deref(), Some("steve"));
                    "spoke"
                }
                _ => "other",
            });
        }
        assert_eq!(seen, vec!["received", "response", "spoke"]);
    }
}
