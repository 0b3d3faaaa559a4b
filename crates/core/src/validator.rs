//! Task validator: an injected success condition for scripted tasks.

use async_trait::async_trait;

/// Reports whether the agent's assigned task is complete.
///
/// Polled opportunistically: when the agent goes idle and before each
/// incoming message is processed.
#[async_trait]
pub trait TaskValidator: Send + Sync {
    async fn validate(&self) -> bool;
}
