//! Flags shared between the event pump and the turn controller.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use chrono::{DateTime, Utc};

/// Per-agent session flags. The event pump flips them as events arrive;
/// the controller reads them at loop checkpoints.
#[derive(Debug, Default)]
pub struct SessionContext {
    shut_up: AtomicBool,
    external_pending: AtomicUsize,
    damage: Mutex<Option<Damage>>,
}

/// The most recent health drop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Damage {
    pub amount: f32,
    pub at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shut_up(&self) -> bool {
        self.shut_up.load(Ordering::SeqCst)
    }

    pub fn set_shut_up(&self, value: bool) {
        self.shut_up.store(value, Ordering::SeqCst);
    }

    /// An external message was queued for the controller.
    pub fn message_queued(&self) {
        self.external_pending.fetch_add(1, Ordering::SeqCst);
    }

    /// The controller picked up a queued external message.
    pub fn message_taken(&self) {
        let _ = self
            .external_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn external_pending(&self) -> bool {
        self.external_pending.load(Ordering::SeqCst) > 0
    }

    /// Track health; a drop is recorded as damage taken now.
    pub fn record_health(&self, health: f32, previous: f32) {
        if health < previous {
            *self.damage.lock().unwrap_or_else(|e| e.into_inner()) = Some(Damage {
                amount: previous - health,
                at: Utc::now(),
            });
        }
    }

    pub fn last_damage(&self) -> Option<Damage> {
        *self.damage.lock().unwrap_or_else(|e| e.into_inner())
    }
}
