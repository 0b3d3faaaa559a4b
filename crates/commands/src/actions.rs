//! Action manager: owns the agent's single long-running action.
//!
//! At most one action runs at a time. Launching a new one first interrupts
//! the current one and waits for it to acknowledge. Finished actions report
//! an [`ActionOutcome`] on the channel returned by [`ActionManager::new`];
//! the caller never blocks on the action itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use blockmind_core::error::WorldError;
use blockmind_core::world::{InterruptFlag, World, WorldAction};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_OUTPUT_CHARS: usize = 500;
const STOP_POLL: Duration = Duration::from_millis(300);

/// Who asked for an action, which decides where its outcome goes.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOrigin {
    /// Launched by a model turn; `remaining_turns` is what was left of the
    /// turn budget when it launched.
    Model { source: String, remaining_turns: Option<u32> },
    /// Launched by a participant typing the command directly.
    Direct { source: String },
    /// Launched by a self-prompt turn.
    SelfPrompt,
    /// Relaunched after the agent went idle.
    Resumed,
}

/// A long-running action to launch.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// e.g. `action:collectBlocks`
    pub label: String,
    pub action: WorldAction,
    /// Relaunch this action when the agent goes idle after an interruption
    pub resume: bool,
    pub timeout: Option<Duration>,
    pub origin: ActionOrigin,
}

/// What a finished action reports.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub label: String,
    pub output: String,
    pub interrupted: bool,
    pub timed_out: bool,
    pub failed: bool,
    pub origin: ActionOrigin,
}

impl ActionOutcome {
    /// Text fed back into history, empty when there is nothing to report.
    ///
    /// An action interrupted by someone else reports nothing; a timed-out one
    /// reports what it got done.
    pub fn summary(&self) -> String {
        if self.interrupted && !self.timed_out {
            return String::new();
        }

        let len = self.output.chars().count();
        let mut summary = if len > MAX_OUTPUT_CHARS {
            let head: String = self.output.chars().take(MAX_OUTPUT_CHARS / 2).collect();
            let tail: String = self.output.chars().skip(len - MAX_OUTPUT_CHARS / 2).collect();
            format!(
                "Action output is very long ({len} chars) and has been shortened.\n\
First outputs:\n{head}\n...skipping many lines.\nFinal outputs:\n{tail}"
            )
        } else {
            format!("Action output:\n{}", self.output)
        };

        if self.timed_out {
            summary.push_str("\nAction timed out.");
        }
        summary
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action {label} refused to stop after {secs} seconds.")]
    StopRefused { label: String, secs: u64 },
}

struct Running {
    id: u64,
    label: String,
    interrupt: InterruptFlag,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    current: Option<Running>,
    resume: Option<ActionRequest>,
    /// Label of an action that ignored its last stop request
    stuck: Option<String>,
}

/// Runs world actions one at a time.
#[derive(Clone)]
pub struct ActionManager {
    world: Arc<dyn World>,
    state: Arc<Mutex<State>>,
    /// Held for a whole stop or launch; a second caller waits on the
    /// acknowledgment the first one is waiting for.
    transition: Arc<AsyncMutex<()>>,
    outcomes: mpsc::Sender<ActionOutcome>,
    next_id: Arc<AtomicU64>,
    stop_timeout: Duration,
}

impl ActionManager {
    /// Create a manager and the channel its outcomes arrive on.
    pub fn new(world: Arc<dyn World>) -> (Self, mpsc::Receiver<ActionOutcome>) {
        let (tx, rx) = mpsc::channel(16);
        let manager = Self {
            world,
            state: Arc::new(Mutex::new(State::default())),
            transition: Arc::new(AsyncMutex::new(())),
            outcomes: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            stop_timeout: Duration::from_secs(10),
        };
        (manager, rx)
    }

    /// How long `stop` waits for an acknowledgment.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_executing(&self) -> bool {
        self.state().current.is_some()
    }

    pub fn current_label(&self) -> Option<String> {
        self.state().current.as_ref().map(|r| r.label.clone())
    }

    /// Label of the action that refused the last stop request, if any.
    pub fn refused_stop(&self) -> Option<String> {
        self.state().stuck.clone()
    }

    /// Whether a resumable action is waiting for the agent to go idle.
    pub fn has_resume(&self) -> bool {
        self.state().resume.is_some()
    }

    /// Interrupt the current action and launch `request` in its place.
    pub async fn launch(&self, request: ActionRequest) -> Result<(), ActionError> {
        let _transition = self.transition.lock().await;
        self.stop_current().await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let interrupt = InterruptFlag::new();

        let mut state = self.state();
        if request.resume {
            state.resume = Some(ActionRequest {
                origin: ActionOrigin::Resumed,
                ..request.clone()
            });
        }

        info!(label = %request.label, id, "Launching action");

        let handle = tokio::spawn(run_action(
            id,
            request.clone(),
            interrupt.clone(),
            self.world.clone(),
            self.state.clone(),
            self.outcomes.clone(),
        ));

        state.current = Some(Running {
            id,
            label: request.label,
            interrupt,
            handle,
        });
        Ok(())
    }

    /// Interrupt the current action and wait for it to finish.
    ///
    /// The action is never aborted; if it ignores its interrupt flag for
    /// longer than the stop timeout an error is returned.
    pub async fn stop(&self) -> Result<(), ActionError> {
        let _transition = self.transition.lock().await;
        self.stop_current().await
    }

    async fn stop_current(&self) -> Result<(), ActionError> {
        let Some(mut running) = self.state().current.take() else {
            return Ok(());
        };

        running.interrupt.raise();
        let deadline = Instant::now() + self.stop_timeout;

        loop {
            match tokio::time::timeout(STOP_POLL, &mut running.handle).await {
                Ok(_) => {
                    debug!(label = %running.label, "Action stopped");
                    self.state().stuck = None;
                    return Ok(());
                }
                Err(_) if Instant::now() >= deadline => {
                    warn!(label = %running.label, "Action refused to stop");
                    let label = running.label.clone();
                    let mut state = self.state();
                    state.stuck = Some(label.clone());
                    state.current = Some(running);
                    drop(state);
                    return Err(ActionError::StopRefused {
                        label,
                        secs: self.stop_timeout.as_secs(),
                    });
                }
                Err(_) => debug!(label = %running.label, "Waiting for action to finish"),
            }
        }
    }

    /// Forget the resumable action.
    pub fn cancel_resume(&self) {
        self.state().resume = None;
    }

    /// Relaunch the resumable action, if any, when nothing else is running.
    ///
    /// Returns whether an action was relaunched.
    pub async fn resume_action(&self, self_prompting: bool) -> Result<bool, ActionError> {
        let request = {
            let state = self.state();
            if state.current.is_some() || self_prompting {
                return Ok(false);
            }
            match &state.resume {
                Some(r) => r.clone(),
                None => return Ok(false),
            }
        };
        info!(label = %request.label, "Resuming action");
        self.launch(request).await?;
        Ok(true)
    }
}

async fn run_action(
    id: u64,
    request: ActionRequest,
    interrupt: InterruptFlag,
    world: Arc<dyn World>,
    state: Arc<Mutex<State>>,
    outcomes: mpsc::Sender<ActionOutcome>,
) {
    let perform = world.perform(request.action.clone(), interrupt.clone());
    tokio::pin!(perform);

    let mut timed_out = false;
    let result = match request.timeout {
        Some(limit) => {
            tokio::select! {
                r = &mut perform => r,
                _ = tokio::time::sleep(limit) => {
                    warn!(label = %request.label, secs = limit.as_secs(), "Action timed out");
                    timed_out = true;
                    interrupt.raise();
                    (&mut perform).await
                }
            }
        }
        None => perform.await,
    };

    let (output, failed, interrupted) = match result {
        Ok(output) => (output, false, interrupt.is_raised()),
        Err(WorldError::Interrupted) => (String::from("Action interrupted."), false, true),
        Err(e) => (e.to_string(), true, interrupt.is_raised()),
    };

    debug!(label = %request.label, id, failed, interrupted, timed_out, "Action finished");

    {
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        if state.current.as_ref().is_some_and(|r| r.id == id) {
            state.current = None;
        }
    }

    let _ = outcomes
        .send(ActionOutcome {
            label: request.label,
            output,
            interrupted,
            timed_out,
            failed,
            origin: request.origin,
        })
        .await;
}
