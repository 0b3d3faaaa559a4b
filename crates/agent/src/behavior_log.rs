//! Ambient observations gathered between turns.

/// Buffer of world observations flushed into history before the next turn.
#[derive(Debug, Clone)]
pub struct BehaviorLog {
    buffer: String,
    max_chars: usize,
    /// Older observations were dropped while buffering
    cut: bool,
}

impl BehaviorLog {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars,
            cut: false,
        }
    }

    /// Buffer an observation. The buffer never holds more than twice what
    /// a flush keeps.
    pub fn push(&mut self, observation: &str) {
        self.buffer.push_str(observation);
        self.buffer.push('\n');

        let len = self.buffer.chars().count();
        if len > self.max_chars * 2 {
            let start = self
                .buffer
                .char_indices()
                .nth(len - self.max_chars)
                .map_or(0, |(i, _)| i);
            self.buffer.drain(..start);
            self.cut = true;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cut = false;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    /// Take the buffered log as a system-turn body, keeping only the most
    /// recent `max_chars` characters.
    pub fn flush(&mut self) -> Option<String> {
        let cut = std::mem::take(&mut self.cut);
        if self.is_empty() {
            self.buffer.clear();
            return None;
        }
        let log = std::mem::take(&mut self.buffer);
        let len = log.chars().count();
        let body = if len > self.max_chars {
            let tail: String = log.chars().skip(len - self.max_chars).collect();
            format!("...{tail}")
        } else if cut {
            format!("...{log}")
        } else {
            log
        };
        Some(format!("Recent behaviors log: \n{body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_flushes_nothing() {
        let mut log = BehaviorLog::new(500);
        assert!(log.flush().is_none());
        log.push("  ");
        assert!(log.flush().is_none());
    }

    #[test]
    fn flush_drains_the_buffer() {
        let mut log = BehaviorLog::new(500);
        log.push("Getting hungry.");
        assert_eq!(log.flush().as_deref(), Some("Recent behaviors log: \nGetting hungry.\n"));
        assert!(log.is_empty());
    }

    #[test]
    fn long_logs_keep_the_most_recent_tail() {
        let mut log = BehaviorLog::new(10);
        log.push("old observation");
        log.push("newest");
        let flushed = log.flush().unwrap();
        assert_eq!(flushed, "Recent behaviors log: \n...on\nnewest\n");
    }

    #[test]
    fn quiet_agent_does_not_grow_the_buffer() {
        let mut log = BehaviorLog::new(20);
        for i in 0..1000 {
            log.push(&format!("tick {i}"));
            assert!(log.buffer.chars().count() <= 40);
        }
        let flushed = log.flush().unwrap();
        assert!(flushed.starts_with("Recent behaviors log: \n..."));
        assert!(flushed.ends_with("tick 999\n"));
        assert!(flushed.chars().count() <= "Recent behaviors log: \n...".len() + 20);
    }
}
