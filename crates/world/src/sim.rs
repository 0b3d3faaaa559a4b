//! Simulated world: an in-memory stand-in for a block-game server.
//!
//! The agent stands at a position with an inventory, surrounded by a pool of
//! collectable blocks, a few entities and other players. Actions advance in
//! steps and check their [`InterruptFlag`] between steps. Chat lines starting
//! with `/` are server commands: `/give`, `/clear`, `/tp` and `/kick`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use blockmind_core::error::WorldError;
use blockmind_core::world::{InterruptFlag, Inventory, Position, World, WorldAction, WorldEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use crate::recipes;

/// Distance covered per movement step.
const STRIDE: f64 = 4.0;
const MAX_HEALTH: f32 = 20.0;
const MAX_HUNGER: u32 = 20;
const TICKS_PER_DAY: u64 = 240;
const NEARBY_RADIUS: f64 = 16.0;

#[derive(Debug, Clone)]
struct Player {
    position: Position,
    inventory: Inventory,
}

struct SimState {
    position: Position,
    health: f32,
    hunger: u32,
    ticks: u64,
    inventory: Inventory,
    blocks: BTreeMap<String, u32>,
    entities: Vec<String>,
    players: BTreeMap<String, Player>,
    chat_log: Vec<String>,
    whispers: Vec<(String, String)>,
    connected: bool,
    hunger_warned: bool,
}

/// An in-memory world the agent can be embodied in.
pub struct SimWorld {
    name: String,
    state: Mutex<SimState>,
    feed: mpsc::Sender<WorldEvent>,
    events: Mutex<Option<mpsc::Receiver<WorldEvent>>>,
    step: Duration,
    echo: bool,
}

impl SimWorld {
    /// A world with default scenery around the spawn point.
    pub fn new(agent_name: impl Into<String>) -> Self {
        let (feed, rx) = mpsc::channel(64);
        let blocks = [("oak_log", 64), ("stone", 128), ("cobblestone", 64), ("dirt", 128)]
            .into_iter()
            .map(|(b, n)| (b.to_string(), n))
            .collect();

        Self {
            name: agent_name.into(),
            state: Mutex::new(SimState {
                position: Position::new(0.0, 64.0, 0.0),
                health: MAX_HEALTH,
                hunger: MAX_HUNGER,
                ticks: 0,
                inventory: Inventory::new(),
                blocks,
                entities: vec!["cow".into(), "sheep".into(), "zombie".into()],
                players: BTreeMap::new(),
                chat_log: Vec::new(),
                whispers: Vec::new(),
                connected: true,
                hunger_warned: false,
            }),
            feed,
            events: Mutex::new(Some(rx)),
            step: Duration::from_millis(100),
            echo: true,
        }
    }

    /// Delay between action steps.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Print outbound chat to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_player(self, name: impl Into<String>, position: Position) -> Self {
        self.lock().players.insert(
            name.into(),
            Player {
                position,
                inventory: Inventory::new(),
            },
        );
        self
    }

    /// Set how many of `block` are within reach.
    pub fn with_blocks(self, block: impl Into<String>, count: u32) -> Self {
        self.lock().blocks.insert(block.into(), count);
        self
    }

    pub fn with_entity(self, kind: impl Into<String>) -> Self {
        self.lock().entities.push(kind.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sender for injecting events, e.g. chat from other participants.
    pub fn feed(&self) -> mpsc::Sender<WorldEvent> {
        self.feed.clone()
    }

    /// Deliver a public chat line from `username`.
    pub fn say(&self, username: &str, message: &str) {
        self.emit(WorldEvent::Chat {
            username: username.into(),
            message: message.into(),
        });
    }

    /// Hurt the agent. At zero health it dies and respawns in place, empty-handed.
    pub fn damage(&self, amount: f32) {
        let died = {
            let mut state = self.lock();
            state.health = (state.health - amount).max(0.0);
            if state.health <= 0.0 {
                state.health = MAX_HEALTH;
                state.inventory.clear();
                true
            } else {
                false
            }
        };

        if died {
            self.emit(WorldEvent::Death {
                message: format!("{} was slain by zombie", self.name),
            });
        } else {
            let health = self.lock().health;
            self.emit(WorldEvent::Health { health });
        }
    }

    /// Everything the agent said in public chat, server commands included.
    pub fn chat_log(&self) -> Vec<String> {
        self.lock().chat_log.clone()
    }

    /// Private messages the agent sent, as `(to, message)`.
    pub fn whispers(&self) -> Vec<(String, String)> {
        self.lock().whispers.clone()
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.lock().inventory.get(item).copied().unwrap_or(0)
    }

    /// Inventory of another player.
    pub fn player_inventory(&self, player: &str) -> Option<Inventory> {
        self.lock().players.get(player).map(|p| p.inventory.clone())
    }

    pub fn player_position(&self, player: &str) -> Option<Position> {
        self.lock().players.get(player).map(|p| p.position)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn emit(&self, event: WorldEvent) {
        if let Err(e) = self.feed.try_send(event) {
            warn!(error = %e, "World event dropped");
        }
    }

    fn ensure_connected(&self) -> Result<(), WorldError> {
        if self.lock().connected {
            Ok(())
        } else {
            Err(WorldError::Disconnected(format!("{} is not in the world", self.name)))
        }
    }

    fn resolve<'a>(&'a self, target: &'a str) -> &'a str {
        match target {
            "@p" | "@s" => &self.name,
            other => other,
        }
    }

    /// Interpret a `/` server command sent through chat.
    fn run_command(&self, line: &str) {
        let parts: Vec<&str> = line.trim_start_matches('/').split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            return;
        };

        let mut events = Vec::new();
        {
            let mut state = self.lock();
            match (command, args) {
                ("give", [player, item, rest @ ..]) => {
                    let count = rest.first().and_then(|n| n.parse().ok()).unwrap_or(1);
                    let player = self.resolve(player);
                    if player == self.name {
                        *state.inventory.entry(item.to_string()).or_default() += count;
                    } else if let Some(p) = state.players.get_mut(player) {
                        *p.inventory.entry(item.to_string()).or_default() += count;
                    }
                    debug!(player, item, count, "Gave items");
                }
                ("clear", [player, ..]) => {
                    let player = self.resolve(player);
                    if player == self.name {
                        state.inventory.clear();
                    } else if let Some(p) = state.players.get_mut(player) {
                        p.inventory.clear();
                    }
                }
                ("tp", [player, target]) => {
                    let player = self.resolve(player);
                    let target = self.resolve(target);
                    let destination = if target == self.name {
                        Some(state.position)
                    } else {
                        state.players.get(target).map(|p| p.position)
                    };
                    match destination {
                        Some(pos) if player == self.name => state.position = pos,
                        Some(pos) => {
                            if let Some(p) = state.players.get_mut(player) {
                                p.position = pos;
                            }
                        }
                        None => warn!(target, "Teleport target not found"),
                    }
                }
                ("tp", [player, x, y, z]) => {
                    let coords = (x.parse::<f64>(), y.parse::<f64>(), z.parse::<f64>());
                    if let (Ok(x), Ok(y), Ok(z)) = coords {
                        let player = self.resolve(player);
                        let pos = Position::new(x, y, z);
                        if player == self.name {
                            state.position = pos;
                        } else if let Some(p) = state.players.get_mut(player) {
                            p.position = pos;
                        }
                    }
                }
                ("kick", [player, reason @ ..]) => {
                    let player = self.resolve(player);
                    let reason = if reason.is_empty() {
                        "Kicked by an operator".to_string()
                    } else {
                        reason.join(" ")
                    };
                    if player == self.name {
                        state.connected = false;
                        events.push(WorldEvent::Kicked { reason });
                    } else if state.players.remove(player).is_some() {
                        info!(player, "Player kicked");
                    }
                }
                _ => warn!(command = %line, "Unknown server command"),
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    async fn pause(&self) {
        tokio::time::sleep(self.step).await;
    }

    /// Pause for continuous loops, which must always yield.
    async fn idle_pause(&self) {
        tokio::time::sleep(self.step.max(Duration::from_millis(1))).await;
    }

    /// Walk toward `target` until within `within` of it.
    async fn walk_to(&self, target: Position, within: f64, interrupt: &InterruptFlag) -> Result<(), WorldError> {
        loop {
            interrupt.check()?;
            let arrived = {
                let mut state = self.lock();
                step_toward(&mut state.position, target, within)
            };
            if arrived {
                return Ok(());
            }
            self.pause().await;
        }
    }

    fn player_target(&self, player: &str) -> Result<Position, WorldError> {
        self.lock()
            .players
            .get(player)
            .map(|p| p.position)
            .ok_or_else(|| WorldError::UnknownTarget(format!("Could not find player {player}.")))
    }

    async fn collect(&self, block: &str, count: u32, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        if self.lock().blocks.get(block).copied().unwrap_or(0) == 0 {
            return Err(WorldError::UnknownTarget(format!("No {block} nearby to collect.")));
        }

        let mut collected = 0;
        while collected < count {
            if interrupt.is_raised() {
                return Ok(format!("Collected {collected} {block} before being interrupted."));
            }
            {
                let mut state = self.lock();
                let Some(left) = state.blocks.get_mut(block).filter(|n| **n > 0) else {
                    break;
                };
                *left -= 1;
                *state.inventory.entry(block.to_string()).or_default() += 1;
            }
            collected += 1;
            self.pause().await;
        }

        if collected < count {
            Ok(format!("Collected {collected} {block}. No more {block} nearby."))
        } else {
            Ok(format!("Collected {collected} {block}."))
        }
    }

    async fn craft(&self, item: &str, count: u32, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        let recipe = recipes::lookup(item)
            .ok_or_else(|| WorldError::UnknownTarget(format!("{item} is not a known recipe.")))?;

        let mut crafted = 0;
        while crafted < count {
            if interrupt.is_raised() {
                break;
            }
            {
                let mut state = self.lock();
                let missing = recipe.missing(&state.inventory);
                if !missing.is_empty() {
                    if crafted == 0 {
                        return Err(WorldError::ActionFailed(format!(
                            "You do not have the resources to craft {item}. Missing: {}.",
                            missing.join(", ")
                        )));
                    }
                    break;
                }
                recipe.apply(&mut state.inventory);
            }
            crafted += 1;
            self.pause().await;
        }

        let have = self.item_count(item);
        Ok(format!(
            "Crafted {item} {crafted} time(s), you now have {have} {item}."
        ))
    }

    async fn attack(&self, entity: &str, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        if !self.lock().entities.iter().any(|e| e == entity) {
            return Err(WorldError::UnknownTarget(format!("No {entity} nearby to attack.")));
        }
        for _ in 0..3 {
            interrupt.check()?;
            self.pause().await;
        }
        let mut state = self.lock();
        if let Some(i) = state.entities.iter().position(|e| e == entity) {
            state.entities.remove(i);
        }
        Ok(format!("Successfully killed {entity}."))
    }

    async fn give(&self, player: &str, item: &str, count: u32, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        let target = self.player_target(player)?;
        if self.item_count(item) < count {
            return Err(WorldError::ActionFailed(format!("You do not have {count} {item} to give.")));
        }
        self.walk_to(target, 2.0, interrupt).await?;

        let mut state = self.lock();
        let left = state.inventory.get(item).copied().unwrap_or(0).saturating_sub(count);
        if left == 0 {
            state.inventory.remove(item);
        } else {
            state.inventory.insert(item.to_string(), left);
        }
        if let Some(p) = state.players.get_mut(player) {
            *p.inventory.entry(item.to_string()).or_default() += count;
        }
        Ok(format!("Gave {count} {item} to {player}."))
    }

    async fn follow(&self, player: &str, distance: f64, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        loop {
            interrupt.check()?;
            let target = self.player_target(player)?;
            {
                let mut state = self.lock();
                step_toward(&mut state.position, target, distance);
            }
            self.idle_pause().await;
        }
    }

    async fn stay(&self, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        loop {
            interrupt.check()?;
            self.idle_pause().await;
        }
    }

    async fn run(&self, action: WorldAction, interrupt: &InterruptFlag) -> Result<String, WorldError> {
        match action {
            WorldAction::GoTo { x, y, z } => {
                let target = Position::new(x, y, z);
                self.walk_to(target, 0.5, interrupt).await?;
                Ok(format!("Reached {target}."))
            }
            WorldAction::GoToPlayer { player, closeness } => {
                let target = self.player_target(&player)?;
                self.walk_to(target, closeness, interrupt).await?;
                Ok(format!("You have reached {player}."))
            }
            WorldAction::FollowPlayer { player, distance } => self.follow(&player, distance, interrupt).await,
            WorldAction::CollectBlocks { block, count } => self.collect(&block, count, interrupt).await,
            WorldAction::CraftRecipe { item, count } => self.craft(&item, count, interrupt).await,
            WorldAction::PlaceHere { block } => {
                let mut state = self.lock();
                match state.inventory.get_mut(&block) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        if *n == 0 {
                            state.inventory.remove(&block);
                        }
                    }
                    _ => return Err(WorldError::ActionFailed(format!("Don't have any {block} to place."))),
                }
                *state.blocks.entry(block.clone()).or_default() += 1;
                Ok(format!("Placed {block} at {}.", state.position))
            }
            WorldAction::Attack { entity } => self.attack(&entity, interrupt).await,
            WorldAction::GivePlayer { player, item, count } => self.give(&player, &item, count, interrupt).await,
            WorldAction::MoveAway { distance } => {
                let from = self.lock().position;
                let target = Position::new(from.x + distance, from.y, from.z);
                self.walk_to(target, 0.5, interrupt).await?;
                Ok(format!("Moved away from {from} to {target}."))
            }
            WorldAction::Stay => self.stay(interrupt).await,
        }
    }
}

/// Move `pos` one stride toward `target`, stopping `within` short of it.
/// Returns whether `pos` is already within range.
fn step_toward(pos: &mut Position, target: Position, within: f64) -> bool {
    let dist = pos.distance_to(&target);
    if dist <= within {
        return true;
    }
    let stride = STRIDE.min(dist - within);
    let scale = stride / dist;
    pos.x += (target.x - pos.x) * scale;
    pos.y += (target.y - pos.y) * scale;
    pos.z += (target.z - pos.z) * scale;
    pos.distance_to(&target) <= within + 1e-9
}

fn time_of_day(ticks: u64) -> &'static str {
    match ticks % TICKS_PER_DAY {
        t if t < TICKS_PER_DAY / 4 => "Morning",
        t if t < TICKS_PER_DAY / 2 => "Afternoon",
        t if t < TICKS_PER_DAY * 3 / 4 => "Evening",
        _ => "Night",
    }
}

#[async_trait]
impl World for SimWorld {
    fn agent_name(&self) -> &str {
        &self.name
    }

    async fn events(&self) -> Result<mpsc::Receiver<WorldEvent>, WorldError> {
        let rx = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| WorldError::Disconnected("event stream already taken".into()))?;
        self.emit(WorldEvent::Spawned);
        info!(agent = %self.name, "Agent spawned");
        Ok(rx)
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        self.ensure_connected()?;
        self.lock().chat_log.push(message.to_string());
        if self.echo {
            println!("<{}> {message}", self.name);
        }
        if message.starts_with('/') {
            self.run_command(message);
        }
        Ok(())
    }

    async fn whisper(&self, to: &str, message: &str) -> Result<(), WorldError> {
        self.ensure_connected()?;
        self.lock().whispers.push((to.to_string(), message.to_string()));
        if self.echo {
            println!("[{} -> {to}] {message}", self.name);
        }
        Ok(())
    }

    async fn position(&self) -> Result<Position, WorldError> {
        self.ensure_connected()?;
        Ok(self.lock().position)
    }

    async fn stats(&self) -> Result<String, WorldError> {
        self.ensure_connected()?;
        let state = self.lock();
        let others: Vec<&str> = state.players.keys().map(String::as_str).collect();
        Ok(format!(
            "STATS\n- Position: {}\n- Health: {} / 20\n- Hunger: {} / 20\n- Time: {}\n- Other Players: {}",
            state.position,
            state.health.round(),
            state.hunger,
            time_of_day(state.ticks),
            if others.is_empty() { "none".to_string() } else { others.join(", ") },
        ))
    }

    async fn inventory(&self) -> Result<Inventory, WorldError> {
        self.ensure_connected()?;
        Ok(self.lock().inventory.clone())
    }

    async fn nearby_blocks(&self) -> Result<Vec<String>, WorldError> {
        self.ensure_connected()?;
        Ok(self
            .lock()
            .blocks
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(b, _)| b.clone())
            .collect())
    }

    async fn nearby_entities(&self) -> Result<Vec<String>, WorldError> {
        self.ensure_connected()?;
        let state = self.lock();
        let players = state
            .players
            .iter()
            .filter(|(_, p)| p.position.distance_to(&state.position) <= NEARBY_RADIUS)
            .map(|(name, _)| format!("player {name}"));
        Ok(players.chain(state.entities.iter().cloned()).collect())
    }

    async fn players(&self) -> Result<Vec<String>, WorldError> {
        self.ensure_connected()?;
        let state = self.lock();
        Ok(std::iter::once(self.name.clone())
            .chain(state.players.keys().cloned())
            .collect())
    }

    async fn perform(&self, action: WorldAction, interrupt: InterruptFlag) -> Result<String, WorldError> {
        self.ensure_connected()?;
        debug!(agent = %self.name, ?action, "Performing action");
        let result = self.run(action, &interrupt).await;
        self.emit(WorldEvent::Idle);
        result
    }

    async fn update(&self) -> Result<Vec<String>, WorldError> {
        self.ensure_connected()?;
        let mut state = self.lock();
        let mut observations = Vec::new();

        state.ticks += 1;
        if state.ticks % 20 == 0 && state.hunger > 0 {
            state.hunger -= 1;
        }
        if state.hunger <= 6 && !state.hunger_warned {
            state.hunger_warned = true;
            observations.push("Getting hungry.".to_string());
        }
        if state.ticks % 10 == 0 && state.hunger >= 18 && state.health < MAX_HEALTH {
            state.health = (state.health + 1.0).min(MAX_HEALTH);
        }
        if state.ticks % TICKS_PER_DAY == TICKS_PER_DAY * 3 / 4 {
            observations.push("Night is falling.".to_string());
        }
        Ok(observations)
    }

    async fn reset_controls(&self) -> Result<(), WorldError> {
        debug!(agent = %self.name, "Controls reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> SimWorld {
        SimWorld::new("andy")
            .with_step(Duration::ZERO)
            .with_echo(false)
            .with_player("steve", Position::new(20.0, 64.0, 0.0))
    }

    #[tokio::test]
    async fn events_start_with_spawn() {
        let w = world();
        let mut rx = w.events().await.unwrap();
        assert_eq!(rx.recv().await, Some(WorldEvent::Spawned));
        assert!(w.events().await.is_err());
    }

    #[tokio::test]
    async fn collecting_fills_the_inventory() {
        let w = world().with_blocks("oak_log", 2);
        let out = w
            .perform(WorldAction::CollectBlocks { block: "oak_log".into(), count: 5 }, InterruptFlag::new())
            .await
            .unwrap();
        assert_eq!(out, "Collected 2 oak_log. No more oak_log nearby.");
        assert_eq!(w.item_count("oak_log"), 2);
        assert!(!w.nearby_blocks().await.unwrap().contains(&"oak_log".to_string()));

        let err = w
            .perform(WorldAction::CollectBlocks { block: "diamond_ore".into(), count: 1 }, InterruptFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn crafting_needs_ingredients() {
        let w = world();
        let err = w
            .perform(WorldAction::CraftRecipe { item: "stick".into(), count: 1 }, InterruptFlag::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("oak_planks: 2"));

        w.chat("/give andy oak_log 1").await.unwrap();
        let out = w
            .perform(WorldAction::CraftRecipe { item: "oak_planks".into(), count: 1 }, InterruptFlag::new())
            .await
            .unwrap();
        assert!(out.contains("you now have 4 oak_planks"));
    }

    #[tokio::test]
    async fn walking_reaches_a_player() {
        let w = world();
        w.perform(
            WorldAction::GoToPlayer { player: "steve".into(), closeness: 3.0 },
            InterruptFlag::new(),
        )
        .await
        .unwrap();
        let here = w.position().await.unwrap();
        assert!(here.distance_to(&Position::new(20.0, 64.0, 0.0)) <= 3.0 + 1e-6);
    }

    #[tokio::test]
    async fn continuous_actions_stop_on_interrupt() {
        let w = std::sync::Arc::new(world());
        let flag = InterruptFlag::new();
        let task = {
            let w = w.clone();
            let flag = flag.clone();
            tokio::spawn(async move { w.perform(WorldAction::Stay, flag).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.raise();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(WorldError::Interrupted)));
    }

    #[tokio::test]
    async fn interrupted_collection_reports_progress() {
        let w = world();
        let flag = InterruptFlag::new();
        flag.raise();
        let out = w
            .perform(WorldAction::CollectBlocks { block: "stone".into(), count: 3 }, flag)
            .await
            .unwrap();
        assert_eq!(out, "Collected 0 stone before being interrupted.");
    }

    #[tokio::test]
    async fn giving_transfers_items() {
        let w = world();
        w.chat("/give @p cobblestone 5").await.unwrap();
        let out = w
            .perform(
                WorldAction::GivePlayer { player: "steve".into(), item: "cobblestone".into(), count: 3 },
                InterruptFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(out, "Gave 3 cobblestone to steve.");
        assert_eq!(w.item_count("cobblestone"), 2);
        assert_eq!(w.player_inventory("steve").unwrap().get("cobblestone"), Some(&3));
    }

    #[tokio::test]
    async fn server_commands() {
        let w = world();
        let mut rx = w.events().await.unwrap();
        let _spawn = rx.recv().await;

        w.chat("/give andy dirt 3").await.unwrap();
        assert_eq!(w.item_count("dirt"), 3);
        w.chat("/clear @p").await.unwrap();
        assert_eq!(w.item_count("dirt"), 0);

        w.chat("/tp andy steve").await.unwrap();
        assert_eq!(w.position().await.unwrap(), Position::new(20.0, 64.0, 0.0));

        w.chat("/kick steve").await.unwrap();
        assert!(w.player_position("steve").is_none());

        w.chat("/kick andy too many requests").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(WorldEvent::Kicked { reason: "too many requests".into() })
        );
        assert!(!w.is_connected());
        assert!(w.chat("hello?").await.is_err());
    }

    #[tokio::test]
    async fn actions_end_with_idle() {
        let w = world();
        let mut rx = w.events().await.unwrap();
        let _spawn = rx.recv().await;
        w.perform(WorldAction::MoveAway { distance: 2.0 }, InterruptFlag::new())
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(WorldEvent::Idle));
    }

    #[tokio::test]
    async fn damage_and_death() {
        let w = world();
        let mut rx = w.events().await.unwrap();
        let _spawn = rx.recv().await;

        w.damage(5.0);
        assert_eq!(rx.recv().await, Some(WorldEvent::Health { health: 15.0 }));
        w.damage(50.0);
        assert!(matches!(rx.recv().await, Some(WorldEvent::Death { .. })));
    }

    #[tokio::test]
    async fn stats_block() {
        let stats = world().stats().await.unwrap();
        assert!(stats.starts_with("STATS\n- Position: x: 0.00, y: 64.00, z: 0.00"));
        assert!(stats.contains("Other Players: steve"));
    }

    #[test]
    fn stepping_stops_short_of_the_target() {
        let mut pos = Position::new(0.0, 0.0, 0.0);
        let target = Position::new(10.0, 0.0, 0.0);
        assert!(!step_toward(&mut pos, target, 2.0));
        assert_eq!(pos, Position::new(4.0, 0.0, 0.0));
        assert!(step_toward(&mut pos, target, 2.0));
        assert!((pos.x - 8.0).abs() < 1e-9);
        assert!(step_toward(&mut pos, target, 2.0));
    }
}
