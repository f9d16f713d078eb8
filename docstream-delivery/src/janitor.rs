//! Periodic eviction of expired master keys.
//!
//! The janitor runs as its own tokio task and is driven by a fixed
//! interval plus a command channel for on-demand sweeps. It holds no lock
//! between sweeps; each sweep locks the key cache one shard at a time.

use crate::error::{DeliveryError, DeliveryResult};
use crate::key_manager::KeyManager;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

enum JanitorCommand {
    SweepNow {
        max_age: Option<Duration>,
        reply: oneshot::Sender<usize>,
    },
    Stop,
}

/// Handle for sending commands to a running janitor.
#[derive(Clone)]
pub struct JanitorHandle {
    command_tx: mpsc::Sender<JanitorCommand>,
}

impl JanitorHandle {
    /// Runs a sweep immediately and returns the number of evicted keys.
    ///
    /// `max_age` overrides the configured TTL for this sweep only.
    pub async fn sweep_now(&self, max_age: Option<Duration>) -> DeliveryResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(JanitorCommand::SweepNow { max_age, reply })
            .await
            .map_err(|_| DeliveryError::JanitorStopped)?;
        rx.await.map_err(|_| DeliveryError::JanitorStopped)
    }

    pub async fn stop(&self) -> DeliveryResult<()> {
        self.command_tx
            .send(JanitorCommand::Stop)
            .await
            .map_err(|_| DeliveryError::JanitorStopped)
    }
}

/// Background sweeper for the master key cache.
pub struct CacheJanitor {
    keys: KeyManager,
    interval: Duration,
    ttl: Duration,
    command_rx: mpsc::Receiver<JanitorCommand>,
}

impl CacheJanitor {
    /// Creates a janitor and its command handle without starting it.
    pub fn new(keys: KeyManager, interval: Duration, ttl: Duration) -> (JanitorHandle, Self) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let janitor = Self {
            keys,
            interval,
            ttl,
            command_rx,
        };
        (JanitorHandle { command_tx }, janitor)
    }

    /// Creates a janitor and spawns it on the current runtime.
    pub fn spawn(keys: KeyManager, interval: Duration, ttl: Duration) -> (JanitorHandle, JoinHandle<()>) {
        let (handle, janitor) = Self::new(keys, interval, ttl);
        let task = tokio::spawn(janitor.run());
        (handle, task)
    }

    /// Runs the sweep loop until stopped or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "cache janitor started: sweeping every {:?}, ttl {:?}",
            self.interval, self.ttl
        );

        let mut sweep_interval = tokio::time::interval(self.interval);
        // Skip first immediate tick
        sweep_interval.tick().await;

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let evicted = self.keys.evict_expired(self.ttl);
                    info!("scheduled cache sweep evicted {evicted} keys, {} remain", self.keys.len());
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(JanitorCommand::SweepNow { max_age, reply }) => {
                            let ttl = max_age.unwrap_or(self.ttl);
                            let evicted = self.keys.evict_expired(ttl);
                            info!("manual cache sweep (max age {ttl:?}) evicted {evicted} keys");
                            let _ = reply.send(evicted);
                        }
                        Some(JanitorCommand::Stop) => {
                            info!("cache janitor stopping");
                            break;
                        }
                        None => {
                            debug!("janitor command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("cache janitor stopped");
    }
}
