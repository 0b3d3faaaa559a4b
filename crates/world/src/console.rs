//! Console feed: lets a human at the terminal talk to the agent.
//!
//! Each non-empty stdin line becomes a chat message from the configured
//! user, or a whisper when the agent only listens to whispers. `exit`,
//! `quit` or EOF stop the feed; the agent keeps running.

use blockmind_core::world::WorldEvent;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Forwards terminal input into a world's event feed.
pub struct ConsoleFeed {
    username: String,
    whisper: bool,
}

impl ConsoleFeed {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            whisper: false,
        }
    }

    /// Deliver lines as whispers instead of public chat.
    pub fn whispering(mut self, whisper: bool) -> Self {
        self.whisper = whisper;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Read stdin on a background task.
    pub fn spawn(self, feed: mpsc::Sender<WorldEvent>) -> JoinHandle<()> {
        tokio::spawn(async move { self.pump(BufReader::new(io::stdin()), feed).await })
    }

    /// Forward lines from `reader` until EOF or an exit word.
    pub async fn pump<R>(&self, reader: R, feed: mpsc::Sender<WorldEvent>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit") {
                        break;
                    }
                    let username = self.username.clone();
                    let event = if self.whisper {
                        WorldEvent::Whisper { username, message: line }
                    } else {
                        WorldEvent::Chat { username, message: line }
                    };
                    if feed.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Console input failed");
                    break;
                }
            }
        }
        debug!(user = %self.username, "Console feed closed");
    }
}
