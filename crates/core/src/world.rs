//! World trait: the abstraction over the environment the agent lives in.
//!
//! A World delivers stimuli (chat, whispers, idle/health/death signals,
//! disconnects) and exposes the action surface the command dispatcher drives.
//! Long-running actions receive an [`InterruptFlag`] they must poll so they
//! can relinquish control promptly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use crate::error::WorldError;

/// A position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x: {:.2}, y: {:.2}, z: {:.2}", self.x, self.y, self.z)
    }
}

/// Item name → count.
pub type Inventory = BTreeMap<String, u32>;

/// Cooperative cancellation flag shared between the action manager and a
/// running world action.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the holder to stop at its next checkpoint.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Err(WorldError::Interrupted)` when raised, for use with `?`.
    pub fn check(&self) -> Result<(), WorldError> {
        if self.is_raised() {
            Err(WorldError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Long-running operations the world can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldAction {
    GoTo { x: f64, y: f64, z: f64 },
    GoToPlayer { player: String, closeness: f64 },
    FollowPlayer { player: String, distance: f64 },
    CollectBlocks { block: String, count: u32 },
    CraftRecipe { item: String, count: u32 },
    PlaceHere { block: String },
    Attack { entity: String },
    GivePlayer { player: String, item: String, count: u32 },
    MoveAway { distance: f64 },
    Stay,
}

impl WorldAction {
    /// Whether the action keeps running until interrupted.
    pub fn is_continuous(&self) -> bool {
        matches!(self, WorldAction::FollowPlayer { .. } | WorldAction::Stay)
    }
}

/// Stimuli delivered by the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldEvent {
    /// The agent entered the world and can act.
    Spawned,
    /// A public chat message.
    Chat { username: String, message: String },
    /// A private message addressed to the agent.
    Whisper { username: String, message: String },
    /// The agent has nothing to do.
    Idle,
    /// Health changed.
    Health { health: f32 },
    /// The agent died; `message` is the world's death message.
    Death { message: String },
    /// The connection ended.
    End { reason: String },
    /// The agent was kicked.
    Kicked { reason: String },
}

/// The core World trait.
#[async_trait]
pub trait World: Send + Sync {
    /// The name the agent is known by in the world.
    fn agent_name(&self) -> &str;

    /// Start delivering events. Called once by the runtime.
    async fn events(&self) -> Result<mpsc::Receiver<WorldEvent>, WorldError>;

    /// Say something in public chat. Lines starting with `/` are world commands.
    async fn chat(&self, message: &str) -> Result<(), WorldError>;

    /// Send a private message.
    async fn whisper(&self, to: &str, message: &str) -> Result<(), WorldError>;

    async fn position(&self) -> Result<Position, WorldError>;

    /// A short human-readable status block (health, hunger, position, time).
    async fn stats(&self) -> Result<String, WorldError>;

    async fn inventory(&self) -> Result<Inventory, WorldError>;

    async fn nearby_blocks(&self) -> Result<Vec<String>, WorldError>;

    async fn nearby_entities(&self) -> Result<Vec<String>, WorldError>;

    /// Names of everyone currently connected, the agent included.
    async fn players(&self) -> Result<Vec<String>, WorldError>;

    /// Run an action to completion, polling `interrupt` between steps.
    async fn perform(&self, action: WorldAction, interrupt: InterruptFlag) -> Result<String, WorldError>;

    /// Ambient monitoring tick; returns observations worth logging.
    async fn update(&self) -> Result<Vec<String>, WorldError>;

    /// Release held controls and lingering navigation when idle.
    async fn reset_controls(&self) -> Result<(), WorldError>;
}
