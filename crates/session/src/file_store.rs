//! File-based session store: one pretty-printed JSON snapshot per agent.
//!
//! Storage location: `<session_dir>/<agent>/memory.json`, where the session
//! directory defaults to `~/.blockmind/sessions`.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-save leaves the previous snapshot intact.

use async_trait::async_trait;
use blockmind_core::error::SessionError;
use blockmind_core::session::{SessionSnapshot, SessionStore};
use std::path::{Path, PathBuf};
use tracing::debug;

const FILE_NAME: &str = "memory.json";

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store the session of `agent_name` under `session_dir`.
    pub fn new(session_dir: &Path, agent_name: &str) -> Self {
        Self {
            path: session_dir.join(agent_name).join(FILE_NAME),
        }
    }

    /// Store at an exact file path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved session");
                return Ok(None);
            }
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read session file {}: {e}",
                    self.path.display()
                )));
            }
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&content)
            .map_err(|e| SessionError::Corrupt(format!("{}: {e}", self.path.display())))?;

        debug!(
            path = %self.path.display(),
            turns = snapshot.turns.len(),
            self_prompt = snapshot.self_prompt.is_some(),
            "Session loaded"
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SessionError::Storage(format!("Failed to create session directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize session: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to replace session file: {e}")))?;

        debug!(path = %self.path.display(), turns = snapshot.turns.len(), "Session saved");
        Ok(())
    }
}
