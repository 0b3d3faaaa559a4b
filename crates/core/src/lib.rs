//! # Blockmind Core
//!
//! Domain types, traits, and error definitions for the Blockmind embodied
//! agent. This crate has **no framework dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the turn loop is a trait here:
//! - [`Provider`]: a language-model backend (the Model Gateway)
//! - [`World`]: the simulated world the agent is embodied in
//! - [`TaskValidator`]: an injected success condition
//! - [`SessionStore`]: durable storage for a resumable session
//!
//! Implementations live in their respective crates, so the loop can be tested
//! with scripted stand-ins.

pub mod error;
pub mod event;
pub mod provider;
pub mod session;
pub mod turn;
pub mod validator;
pub mod world;

// Re-export key types at crate root for ergonomics
pub use error::{CommandError, Error, ProviderError, Result, SessionError, WorldError};
pub use event::{DomainEvent, EventBus};
pub use provider::{Provider, ProviderRequest, ProviderResponse, RequestMessage, RequestRole};
pub use session::{SessionSnapshot, SessionStore};
pub use turn::{SYSTEM_SPEAKER, Turn};
pub use validator::TaskValidator;
pub use world::{InterruptFlag, Inventory, Position, World, WorldAction, WorldEvent};
