//! In-memory session store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use blockmind_core::error::SessionError;
use blockmind_core::session::{SessionSnapshot, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps the last saved snapshot in memory.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    snapshot: Arc<RwLock<Option<SessionSnapshot>>>,
    saves: Arc<RwLock<usize>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a previously saved snapshot.
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Some(snapshot))),
            saves: Arc::new(RwLock::new(0)),
        }
    }

    /// The last saved snapshot.
    pub async fn latest(&self) -> Option<SessionSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// How many times `save` was called.
    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        *self.saves.write().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockmind_core::Turn;

    #[tokio::test]
    async fn save_and_load() {
        let store = InMemorySessionStore::new();
        assert!(store.load().await.unwrap().is_none());

        store
            .save(&SessionSnapshot::new("andy", vec![Turn::system("hi")], None))
            .await
            .unwrap();
        assert_eq!(store.save_count().await, 1);
        assert_eq!(store.load().await.unwrap().unwrap().turns.len(), 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemorySessionStore::new();
        let observer = store.clone();
        store.save(&SessionSnapshot::new("andy", vec![], Some("mine".into()))).await.unwrap();
        assert_eq!(observer.latest().await.unwrap().self_prompt.as_deref(), Some("mine"));
    }
}
