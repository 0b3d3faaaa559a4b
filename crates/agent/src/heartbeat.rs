//! Fixed-interval world update loop.
//!
//! The heartbeat drives the world's periodic update and hands the resulting
//! observations to the runtime. Ticks never overlap: the next update starts
//! only after the previous one finished, and when the runtime is busy the
//! undelivered beats are merged rather than queued.

use std::sync::Arc;
use std::time::Duration;
use blockmind_core::error::WorldError;
use blockmind_core::world::World;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One or more merged update ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beat {
    /// Time covered since the previous delivered beat
    pub elapsed: Duration,
    pub observations: Vec<String>,
}

impl Beat {
    fn merge(&mut self, later: Beat) {
        self.elapsed += later.elapsed;
        self.observations.extend(later.observations);
    }
}

pub struct Heartbeat {
    world: Arc<dyn World>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(world: Arc<dyn World>, interval: Duration) -> Self {
        Self { world, interval }
    }

    /// Start the background loop. It ends when the world disconnects or the
    /// receiver is dropped.
    pub fn start(&self) -> (mpsc::Receiver<Beat>, tokio::task::JoinHandle<()>) {
        let world = self.world.clone();
        let interval = self.interval;
        let (tx, rx) = mpsc::channel::<Beat>(1);

        let handle = tokio::spawn(async move {
            let mut last = Instant::now();
            let mut pending: Option<Beat> = None;

            loop {
                let started = Instant::now();
                let observations = match world.update().await {
                    Ok(observations) => observations,
                    Err(WorldError::Disconnected(reason)) => {
                        debug!(reason = %reason, "World disconnected, stopping heartbeat");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "World update failed");
                        Vec::new()
                    }
                };

                let mut beat = pending.take().unwrap_or_default();
                beat.merge(Beat {
                    elapsed: started - last,
                    observations,
                });
                last = started;

                match tx.try_send(beat) {
                    Ok(()) => {}
                    Err(TrySendError::Full(beat)) => pending = Some(beat),
                    Err(TrySendError::Closed(_)) => {
                        debug!("Heartbeat receiver dropped, stopping");
                        return;
                    }
                }

                tokio::time::sleep(interval.saturating_sub(started.elapsed())).await;
            }
        });

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockmind_world::SimWorld;

    #[test]
    fn merged_beats_keep_every_observation() {
        let mut beat = Beat {
            elapsed: Duration::from_millis(300),
            observations: vec!["Getting hungry.".into()],
        };
        beat.merge(Beat {
            elapsed: Duration::from_millis(300),
            observations: vec!["Night is falling.".into()],
        });
        assert_eq!(beat.elapsed, Duration::from_millis(600));
        assert_eq!(beat.observations, vec!["Getting hungry.", "Night is falling."]);
    }

    #[tokio::test(start_paused = true)]
    async fn beats_cover_the_elapsed_time() {
        let world = Arc::new(SimWorld::new("andy").with_echo(false));
        let (mut beats, handle) = Heartbeat::new(world, Duration::from_millis(300)).start();

        let first = beats.recv().await.unwrap();
        assert_eq!(first.elapsed, Duration::ZERO);

        // let several ticks pile up while nobody reads
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let queued = beats.recv().await.unwrap();
        assert_eq!(queued.elapsed, Duration::from_millis(300));
        let merged = beats.recv().await.unwrap();
        assert!(merged.elapsed >= Duration::from_millis(600));

        handle.abort();
    }

    #[tokio::test]
    async fn stops_when_the_world_disconnects() {
        let world = Arc::new(SimWorld::new("andy").with_echo(false));
        let (mut beats, handle) = Heartbeat::new(world.clone(), Duration::from_millis(5)).start();

        world.chat("/kick @s").await.unwrap();
        while beats.recv().await.is_some() {}
        handle.await.unwrap();
    }
}
