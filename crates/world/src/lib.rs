//! # Blockmind World
//!
//! A simulated block world implementing [`blockmind_core::World`], plus a
//! console feed that turns terminal input into chat from a human user.

pub mod console;
pub mod recipes;
pub mod sim;

pub use console::ConsoleFeed;
pub use sim::SimWorld;
