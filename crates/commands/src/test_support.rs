//! Scripted stand-ins used by this crate's tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use blockmind_core::error::WorldError;
use blockmind_core::world::{InterruptFlag, Inventory, Position, World, WorldAction, WorldEvent};
use tokio::sync::mpsc;
use crate::actions::{ActionError, ActionManager, ActionOrigin, ActionOutcome};
use crate::dispatcher::AgentHandle;

#[derive(Default)]
struct ScriptState {
    inventory: Inventory,
    performed: Vec<String>,
    chat: Vec<String>,
}

/// A world whose actions succeed instantly, except continuous ones which
/// loop until interrupted.
pub struct ScriptedWorld {
    state: Mutex<ScriptState>,
    ignore_interrupts: bool,
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            ignore_interrupts: false,
        }
    }

    /// Continuous actions never acknowledge their interrupt flag.
    pub fn ignoring_interrupts(mut self) -> Self {
        self.ignore_interrupts = true;
        self
    }

    pub fn give(&self, item: &str, count: u32) {
        *self.state.lock().unwrap().inventory.entry(item.into()).or_default() += count;
    }

    pub fn inventory_count(&self, item: &str) -> u32 {
        self.state.lock().unwrap().inventory.get(item).copied().unwrap_or(0)
    }

    pub fn performed(&self) -> Vec<String> {
        self.state.lock().unwrap().performed.clone()
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.state.lock().unwrap().chat.clone()
    }

    async fn hold(&self, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !self.ignore_interrupts {
                interrupt.check()?;
            }
        }
    }
}

fn action_name(action: &WorldAction) -> &'static str {
    match action {
        WorldAction::GoTo { .. } => "goTo",
        WorldAction::GoToPlayer { .. } => "goToPlayer",
        WorldAction::FollowPlayer { .. } => "followPlayer",
        WorldAction::CollectBlocks { .. } => "collectBlocks",
        WorldAction::CraftRecipe { .. } => "craftRecipe",
        WorldAction::PlaceHere { .. } => "placeHere",
        WorldAction::Attack { .. } => "attack",
        WorldAction::GivePlayer { .. } => "givePlayer",
        WorldAction::MoveAway { .. } => "moveAway",
        WorldAction::Stay => "stay",
    }
}

#[async_trait]
impl World for ScriptedWorld {
    fn agent_name(&self) -> &str {
        "andy"
    }

    async fn events(&self) -> Result<mpsc::Receiver<WorldEvent>, WorldError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        self.state.lock().unwrap().chat.push(message.to_string());
        Ok(())
    }

    async fn whisper(&self, _to: &str, message: &str) -> Result<(), WorldError> {
        self.chat(message).await
    }

    async fn position(&self) -> Result<Position, WorldError> {
        Ok(Position::new(10.0, 64.0, -5.0))
    }

    async fn stats(&self) -> Result<String, WorldError> {
        Ok("STATS\n- Health: 20 / 20".into())
    }

    async fn inventory(&self) -> Result<Inventory, WorldError> {
        Ok(self.state.lock().unwrap().inventory.clone())
    }

    async fn nearby_blocks(&self) -> Result<Vec<String>, WorldError> {
        Ok(vec!["stone".into(), "dirt".into()])
    }

    async fn nearby_entities(&self) -> Result<Vec<String>, WorldError> {
        Ok(vec!["steve".into()])
    }

    async fn players(&self) -> Result<Vec<String>, WorldError> {
        Ok(vec!["andy".into(), "steve".into()])
    }

    async fn perform(&self, action: WorldAction, interrupt: InterruptFlag) -> Result<String, WorldError> {
        self.state.lock().unwrap().performed.push(action_name(&action).to_string());
        match action {
            WorldAction::Stay | WorldAction::FollowPlayer { .. } => self.hold(&interrupt).await,
            WorldAction::CollectBlocks { block, count } => {
                self.give(&block, count);
                Ok(format!("Collected {count} {block}."))
            }
            WorldAction::Attack { entity } if entity == "dragon" => {
                Err(WorldError::UnknownTarget(format!("no {entity} nearby")))
            }
            other => Ok(format!("Finished {}.", action_name(&other))),
        }
    }

    async fn update(&self) -> Result<Vec<String>, WorldError> {
        Ok(Vec::new())
    }

    async fn reset_controls(&self) -> Result<(), WorldError> {
        Ok(())
    }
}

/// Minimal agent state for dispatcher tests. Commands run as if typed by
/// `steve`.
pub struct TestAgent {
    world: Arc<ScriptedWorld>,
    actions: ActionManager,
    pub outcomes: mpsc::Receiver<ActionOutcome>,
    pub goal: Option<String>,
    pub muted: bool,
    pub places: BTreeMap<String, Position>,
}

impl TestAgent {
    pub fn new(world: Arc<ScriptedWorld>) -> Self {
        let (actions, outcomes) = ActionManager::new(world.clone());
        Self {
            world,
            actions,
            outcomes,
            goal: None,
            muted: false,
            places: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl AgentHandle for TestAgent {
    fn name(&self) -> &str {
        "andy"
    }

    fn world(&self) -> Arc<dyn World> {
        self.world.clone()
    }

    fn actions(&self) -> &ActionManager {
        &self.actions
    }

    fn action_origin(&self) -> ActionOrigin {
        ActionOrigin::Direct { source: "steve".into() }
    }

    fn start_self_prompt(&mut self, goal: String) {
        self.goal = Some(goal);
    }

    async fn stop_self_prompt(&mut self, graceful: bool) -> Result<(), ActionError> {
        self.goal = None;
        if !graceful {
            self.actions.stop().await?;
        }
        Ok(())
    }

    fn self_prompt_active(&self) -> bool {
        self.goal.is_some()
    }

    fn shut_up(&mut self) {
        self.muted = true;
    }

    fn clear_behavior_log(&mut self) {}

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
