//! Agent runtime: wires the world, the heartbeat and the turn controller.
//!
//! World events are translated into [`Intent`]s by a background pump. The
//! runtime then feeds intents, action outcomes and heartbeat beats to the
//! controller one at a time until a shutdown reason comes up.

use std::sync::Arc;
use std::time::Duration;
use blockmind_commands::{ActionManager, ActionOutcome, AgentHandle};
use blockmind_config::AppConfig;
use blockmind_core::error::{SessionError, WorldError};
use blockmind_core::event::EventBus;
use blockmind_core::provider::Provider;
use blockmind_core::session::SessionStore;
use blockmind_core::turn::SYSTEM_SPEAKER;
use blockmind_core::validator::TaskValidator;
use blockmind_core::world::{World, WorldEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::context::SessionContext;
use crate::controller::TurnController;
use crate::error::{AgentError, ShutdownReason};
use crate::heartbeat::Heartbeat;
use crate::validator::InventoryTargetValidator;

/// What the event pump asks of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Spawned,
    Message {
        source: String,
        content: String,
        /// Sent by a participant other than a peer agent
        external: bool,
    },
    Idle,
    Death {
        message: String,
    },
    Fatal(ShutdownReason),
}

/// Translates raw world events. Runs concurrently with turns, so it only
/// touches shared flags and the action manager.
struct EventPump {
    name: String,
    peers: Vec<String>,
    ignore: Vec<String>,
    context: Arc<SessionContext>,
    actions: ActionManager,
    health: f32,
}

impl EventPump {
    fn spawn(mut self, mut events: mpsc::Receiver<WorldEvent>, tx: mpsc::Sender<Intent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(intent) = self.translate(event, &tx) else {
                    continue;
                };
                let last = matches!(intent, Intent::Fatal(_));
                if tx.send(intent).await.is_err() || last {
                    break;
                }
            }
            debug!(agent = %self.name, "Event pump stopped");
        })
    }

    fn translate(&mut self, event: WorldEvent, tx: &mpsc::Sender<Intent>) -> Option<Intent> {
        match event {
            WorldEvent::Spawned => Some(Intent::Spawned),
            WorldEvent::Chat { username, message } => {
                let from_peer = self.peers.contains(&username);
                // with peers around, public chat is their channel only
                if !self.peers.is_empty() && !from_peer {
                    return None;
                }
                self.message(username, message)
            }
            WorldEvent::Whisper { username, message } => self.message(username, message),
            WorldEvent::Idle => Some(Intent::Idle),
            WorldEvent::Health { health } => {
                self.context.record_health(health, self.health);
                self.health = health;
                None
            }
            WorldEvent::Death { message } => {
                info!(agent = %self.name, message = %message, "Agent died");
                self.actions.cancel_resume();
                let actions = self.actions.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = actions.stop().await {
                        let _ = tx.send(Intent::Fatal(e.into())).await;
                    }
                });
                Some(Intent::Death { message })
            }
            WorldEvent::End { reason } => Some(Intent::Fatal(ShutdownReason::Disconnected(reason))),
            WorldEvent::Kicked { reason } => Some(Intent::Fatal(ShutdownReason::Kicked(reason))),
        }
    }

    fn message(&self, username: String, message: String) -> Option<Intent> {
        if username == self.name {
            return None;
        }
        if self.ignore.iter().any(|prefix| message.starts_with(prefix.as_str())) {
            debug!(message = %message, "Ignoring world feedback");
            return None;
        }

        self.context.set_shut_up(false);
        let external = !self.peers.contains(&username);
        if external {
            self.context.message_queued();
        }
        Some(Intent::Message {
            source: username,
            content: message,
            external,
        })
    }
}

/// Builder for an [`AgentRuntime`].
pub struct AgentBuilder {
    config: AppConfig,
    world: Arc<dyn World>,
    provider: Arc<dyn Provider>,
    store: Option<Arc<dyn SessionStore>>,
    validator: Option<Arc<dyn TaskValidator>>,
    events: Option<Arc<EventBus>>,
    load_memory: bool,
    init_message: Option<String>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig, world: Arc<dyn World>, provider: Arc<dyn Provider>) -> Self {
        let init_message = config.agent.init_message.clone();
        Self {
            config,
            world,
            provider,
            store: None,
            validator: None,
            events: None,
            load_memory: true,
            init_message,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the validator derived from the task.
    pub fn with_validator(mut self, validator: Arc<dyn TaskValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether to resume from the saved session.
    pub fn load_memory(mut self, load: bool) -> Self {
        self.load_memory = load;
        self
    }

    pub fn init_message(mut self, message: Option<String>) -> Self {
        self.init_message = message;
        self
    }

    pub fn build(self) -> AgentRuntime {
        let context = Arc::new(SessionContext::new());
        let validator = self.validator.or_else(|| {
            let task = self.config.task.as_ref()?;
            InventoryTargetValidator::from_task(task, self.world.clone())
                .map(|v| Arc::new(v) as Arc<dyn TaskValidator>)
        });

        let (mut controller, outcomes) = TurnController::new(&self.config, self.world.clone(), self.provider);
        controller = controller.with_validator(validator).with_context(context.clone());
        if let Some(store) = self.store {
            controller = controller.with_store(store);
        }
        if let Some(events) = self.events {
            controller = controller.with_events(events);
        }

        AgentRuntime {
            config: self.config,
            world: self.world,
            controller,
            outcomes: Some(outcomes),
            context,
            load_memory: self.load_memory,
            init_message: self.init_message,
        }
    }
}

pub struct AgentRuntime {
    config: AppConfig,
    world: Arc<dyn World>,
    controller: TurnController,
    outcomes: Option<mpsc::Receiver<ActionOutcome>>,
    context: Arc<SessionContext>,
    load_memory: bool,
    init_message: Option<String>,
}

impl AgentRuntime {
    pub fn controller(&self) -> &TurnController {
        &self.controller
    }

    /// Run until the agent shuts down. Returns why it did.
    pub async fn run(mut self) -> Result<ShutdownReason, AgentError> {
        let name = self.config.profile.name.clone();
        let mut outcomes = self
            .outcomes
            .take()
            .ok_or_else(|| WorldError::Disconnected("runtime already ran".into()))?;
        let events = self.world.events().await?;
        let (intent_tx, mut intents) = mpsc::channel::<Intent>(64);

        let pump = EventPump {
            name: name.clone(),
            peers: self.config.profile.peers.clone(),
            ignore: self.config.agent.ignore_messages.clone(),
            context: self.context.clone(),
            actions: self.controller.actions().clone(),
            health: 20.0,
        }
        .spawn(events, intent_tx);

        loop {
            match intents.recv().await {
                Some(Intent::Spawned) => break,
                Some(Intent::Fatal(reason)) => {
                    pump.abort();
                    return Ok(reason);
                }
                Some(other) => debug!(intent = ?other, "Dropping event received before spawn"),
                None => return Err(WorldError::Disconnected("event stream closed before spawn".into()).into()),
            }
        }
        info!(agent = %name, "Agent spawned");

        let (mut beats, heartbeat) =
            Heartbeat::new(self.world.clone(), Duration::from_millis(self.config.agent.tick_interval_ms)).start();

        let startup = self.startup().await;
        let reason = match self.settle(startup).await {
            Some(reason) => reason,
            None => loop {
                let step = tokio::select! {
                    Some(intent) = intents.recv() => self.on_intent(intent).await,
                    Some(outcome) = outcomes.recv() => self.controller.handle_action_outcome(outcome).await,
                    Some(beat) = beats.recv() => self.controller.tick(beat.elapsed, beat.observations).await,
                    else => Err(WorldError::Disconnected("world event stream closed".into()).into()),
                };
                if let Some(reason) = self.settle(step).await {
                    break reason;
                }
            },
        };

        heartbeat.abort();
        pump.abort();
        info!(agent = %name, reason = %reason, "Agent stopped");
        Ok(reason)
    }

    async fn startup(&mut self) -> Result<(), AgentError> {
        tokio::time::sleep(Duration::from_millis(self.config.agent.spawn_settle_ms)).await;

        let goal = if self.load_memory {
            match self.controller.store().load().await {
                Ok(Some(snapshot)) => self.controller.restore(snapshot),
                Ok(None) => None,
                Err(SessionError::Corrupt(e)) => {
                    warn!(error = %e, "Saved session is corrupt, starting fresh");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Could not load saved session");
                    None
                }
            }
        } else {
            None
        };

        self.bootstrap_task().await?;

        if let Some(goal) = goal {
            self.controller.resume_goal(&goal);
        } else if let Some(init) = self.init_message.clone() {
            self.controller.handle_message(SYSTEM_SPEAKER, &init, Some(2)).await?;
        } else {
            self.world.chat(&format!("Hello world! I am {}", self.config.profile.name)).await?;
        }

        self.controller.on_idle().await
    }

    /// Clear and refill the inventory for a scripted task, then gather the
    /// agents at the first one listed.
    async fn bootstrap_task(&mut self) -> Result<(), AgentError> {
        let Some(task) = self.config.task.clone() else {
            return Ok(());
        };
        let name = &self.config.profile.name;
        let settle = Duration::from_millis(self.config.agent.inventory_settle_ms);

        self.world.chat(&format!("/clear {name}")).await?;
        tokio::time::sleep(settle).await;

        let mut items: Vec<(String, u32)> = task.inventory_for(name).into_iter().collect();
        items.sort();
        for (item, count) in items {
            self.world.chat(&format!("/give {name} {item} {count}")).await?;
            tokio::time::sleep(settle).await;
        }

        if let Some(leader) = task.agent_names.first().filter(|leader| *leader != name) {
            self.world.chat(&format!("/tp {name} {leader}")).await?;
        }
        info!(agent = %name, kind = ?task.kind, "Task inventory prepared");
        Ok(())
    }

    async fn on_intent(&mut self, intent: Intent) -> Result<(), AgentError> {
        match intent {
            Intent::Message {
                source,
                content,
                external,
            } => {
                if external {
                    self.context.message_taken();
                }
                self.controller.handle_message(&source, &content, None).await?;
            }
            Intent::Idle => self.controller.on_idle().await?,
            Intent::Death { message } => {
                self.controller.on_death(&message).await?;
            }
            Intent::Fatal(reason) => return Err(self.controller.shutdown(reason).await),
            Intent::Spawned => debug!("Respawned"),
        }
        Ok(())
    }

    /// Turn a step result into a shutdown reason, if it ends the run.
    async fn settle(&mut self, step: Result<(), AgentError>) -> Option<ShutdownReason> {
        match step {
            Ok(()) => None,
            Err(AgentError::Shutdown(reason)) => Some(reason),
            Err(AgentError::World(WorldError::Disconnected(reason))) => {
                match self.controller.shutdown(ShutdownReason::Disconnected(reason)).await {
                    AgentError::Shutdown(reason) => Some(reason),
                    _ => None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Turn failed");
                None
            }
        }
    }
}
