//! Periodic sync driver
//!
//! Runs a cycle on start, then once per interval. Cycles run on the blocking
//! pool and the loop awaits each one before polling the timer again, so ticks
//! that fall inside a running cycle are skipped rather than queued.

use anyhow::{Result, bail};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{CycleError, CycleReport, SyncEngine};

/// Commands accepted by a running watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherCommand {
    /// Run a cycle now
    TriggerSync,
    /// Exit after the current cycle, if any
    Stop,
}

/// Handle to a spawned watcher task
pub struct WatcherHandle {
    commands: mpsc::Sender<WatcherCommand>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Ask for an immediate cycle; false if the watcher has exited
    pub async fn trigger(&self) -> bool {
        self.commands.send(WatcherCommand::TriggerSync).await.is_ok()
    }

    /// Stop the watcher and wait for it to exit
    pub async fn stop(self) {
        let _ = self.commands.send(WatcherCommand::Stop).await;
        if let Err(e) = self.task.await {
            error!("Watcher task panicked: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Timer-driven sync loop around a [`SyncEngine`]
pub struct Watcher {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl Watcher {
    /// Fails for a zero interval, which the tokio timer cannot tick on
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            bail!("Sync interval must be greater than zero");
        }
        Ok(Self { engine, interval })
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self) -> WatcherHandle {
        let (commands, rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(rx));
        WatcherHandle { commands, task }
    }

    async fn run(self, mut commands: mpsc::Receiver<WatcherCommand>) {
        info!("Sync watcher started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately, which gives the initial cycle
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                command = commands.recv() => match command {
                    Some(WatcherCommand::TriggerSync) => {
                        self.run_cycle().await;
                        ticker.reset();
                    }
                    Some(WatcherCommand::Stop) | None => break,
                },
            }
        }

        info!("Sync watcher stopped");
    }

    async fn run_cycle(&self) -> Option<CycleReport> {
        let engine = self.engine.clone();

        match tokio::task::spawn_blocking(move || engine.run_cycle()).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(CycleError::AlreadyRunning)) => {
                debug!("Previous sync cycle still running; skipping tick");
                None
            }
            Ok(Err(e)) => {
                error!("Sync cycle failed: {}", e);
                None
            }
            Err(e) => {
                error!("Sync cycle panicked: {}", e);
                None
            }
        }
    }
}
