//! Self-prompting: the agent pursuing a goal without being spoken to.
//!
//! ```text
//! Idle ──start──▶ Running ──stop (no turn in flight)──▶ Idle
//!                    │
//!                    └──stop (turn in flight)──▶ Stopping ──turn done──▶ Idle
//! ```
//!
//! The self-prompter never runs turns itself. The heartbeat feeds it elapsed
//! time through [`SelfPrompter::poll`], and when the agent has been idle for
//! the cooldown it hands back the goal for the controller to run one turn.

use std::time::Duration;
use blockmind_commands::{ActionError, ActionManager};
use blockmind_config::SelfPromptConfig;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfPromptState {
    Idle,
    Running,
    /// Stop requested while a turn was in flight
    Stopping,
}

/// What to do after a self-prompt turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// The error budget ran out; `message` is said to the world.
    Stop { message: String },
}

#[derive(Debug)]
pub struct SelfPrompter {
    state: SelfPromptState,
    goal: Option<String>,
    cooldown: Duration,
    error_budget: u32,
    idle_for: Duration,
    in_flight: bool,
    turn_count: u32,
    unproductive: u32,
}

impl SelfPrompter {
    pub fn new(config: &SelfPromptConfig) -> Self {
        Self {
            state: SelfPromptState::Idle,
            goal: None,
            cooldown: Duration::from_millis(config.cooldown_ms),
            error_budget: config.error_budget.max(1),
            idle_for: Duration::ZERO,
            in_flight: false,
            turn_count: 0,
            unproductive: 0,
        }
    }

    pub fn state(&self) -> SelfPromptState {
        self.state
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.state == SelfPromptState::Running
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Start pursuing `goal`. The first turn is due on the next poll.
    pub fn start(&mut self, goal: impl Into<String>) {
        let goal = goal.into();
        info!(goal = %goal, "Self-prompting started");
        self.state = SelfPromptState::Running;
        self.goal = Some(goal);
        self.turn_count = 0;
        self.unproductive = 0;
        self.idle_for = self.cooldown;
    }

    /// Stop self-prompting. A non-graceful stop also stops the current action.
    pub async fn stop(&mut self, graceful: bool, actions: &ActionManager) -> Result<(), ActionError> {
        if self.state != SelfPromptState::Idle {
            info!(graceful, "Self-prompting stopped");
        }
        self.state = if self.in_flight {
            SelfPromptState::Stopping
        } else {
            SelfPromptState::Idle
        };
        self.goal = None;
        self.idle_for = Duration::ZERO;

        if !graceful {
            actions.stop().await?;
        }
        Ok(())
    }

    /// Whether the turn in progress must give way.
    ///
    /// Only self-prompt turns yield: to a stop request, or to an external
    /// message waiting to be handled while self-prompting.
    pub fn should_interrupt(&self, is_self_prompt_turn: bool, external_pending: bool) -> bool {
        is_self_prompt_turn
            && match self.state {
                SelfPromptState::Stopping => true,
                SelfPromptState::Running => external_pending,
                SelfPromptState::Idle => false,
            }
    }

    /// Advance the idle clock by `delta`. Returns the goal when a self-prompt
    /// turn is due; the turn must be closed with [`SelfPrompter::record_turn`].
    pub fn poll(&mut self, delta: Duration, agent_idle: bool) -> Option<String> {
        if self.state != SelfPromptState::Running || self.in_flight {
            self.idle_for = Duration::ZERO;
            return None;
        }
        if !agent_idle {
            self.idle_for = Duration::ZERO;
            return None;
        }

        self.idle_for += delta;
        if self.idle_for < self.cooldown {
            return None;
        }

        self.idle_for = Duration::ZERO;
        self.in_flight = true;
        self.turn_count += 1;
        debug!(turn = self.turn_count, "Self-prompt turn due");
        self.goal.clone()
    }

    /// Close the turn handed out by `poll`.
    pub fn record_turn(&mut self, used_command: bool) -> Verdict {
        self.in_flight = false;
        if self.state == SelfPromptState::Stopping {
            self.state = SelfPromptState::Idle;
            return Verdict::Continue;
        }
        if self.state != SelfPromptState::Running {
            return Verdict::Continue;
        }

        if used_command {
            self.unproductive = 0;
            return Verdict::Continue;
        }

        self.unproductive += 1;
        if self.unproductive < self.error_budget {
            return Verdict::Continue;
        }

        info!(turns = self.unproductive, "Self-prompting gave up");
        self.state = SelfPromptState::Idle;
        self.goal = None;
        Verdict::Stop {
            message: format!(
                "Agent did not use command in the last {} auto-prompts. Stopping auto-prompting.",
                self.error_budget
            ),
        }
    }

    /// A user launched an action mid-goal: wait out a full cooldown after
    /// it finishes.
    pub fn pause_for_user_action(&mut self) {
        self.idle_for = Duration::ZERO;
    }
}
