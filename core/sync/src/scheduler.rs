//! Sync scheduling - manual requests and periodic cycles.
//!
//! The scheduler serializes sync triggers onto one channel; the engine's
//! own in-progress guard handles anything that still overlaps (a manual
//! request landing mid-periodic-cycle is dropped by the engine, not queued).

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Interval;
use tracing::{debug, info, warn};

use quillvault_common::{Error, Result};

use crate::engine::SyncOutcome;

/// When automatic cycles happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Only explicit requests sync.
    Manual,
    /// Sync on a fixed interval, plus explicit requests.
    Periodic { interval: Duration },
}

impl SyncMode {
    /// Mode for a settings value: 0 seconds means manual only.
    pub fn from_interval_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Manual
        } else {
            Self::Periodic {
                interval: Duration::from_secs(secs),
            }
        }
    }
}

enum SchedulerRequest {
    Sync {
        force_full: bool,
        reply: oneshot::Sender<Result<SyncOutcome>>,
    },
    Shutdown,
}

/// Request side of the scheduler.
pub struct SyncScheduler {
    request_tx: mpsc::Sender<SchedulerRequest>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs it.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);
        (
            Self { request_tx },
            SyncSchedulerHandle { mode, request_rx },
        )
    }

    /// Request a sync and wait for its outcome.
    pub async fn request_sync(&self, force_full: bool) -> Result<SyncOutcome> {
        let (reply, response) = oneshot::channel();
        self.request_tx
            .send(SchedulerRequest::Sync { force_full, reply })
            .await
            .map_err(|_| Error::Vault("scheduler not running".to_string()))?;
        response
            .await
            .map_err(|_| Error::Vault("scheduler dropped the request".to_string()))?
    }

    /// Stop the scheduler loop.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(SchedulerRequest::Shutdown).await;
    }
}

/// Run side of the scheduler; spawn [`run`](Self::run) in a task.
pub struct SyncSchedulerHandle {
    mode: SyncMode,
    request_rx: mpsc::Receiver<SchedulerRequest>,
}

impl SyncSchedulerHandle {
    /// Drive the loop, calling `sync_fn(force_full)` for every trigger.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(bool) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<SyncOutcome>> + Send,
    {
        let mut ticker = match self.mode {
            SyncMode::Periodic { interval } => {
                let mut ticker = tokio::time::interval(interval);
                // The first tick of a tokio interval fires immediately;
                // consume it so the first automatic cycle waits one period.
                ticker.tick().await;
                Some(ticker)
            }
            SyncMode::Manual => None,
        };

        info!(mode = ?self.mode, "sync scheduler started");

        loop {
            tokio::select! {
                request = self.request_rx.recv() => match request {
                    Some(SchedulerRequest::Sync { force_full, reply }) => {
                        debug!(force_full, "manual sync requested");
                        let _ = reply.send(sync_fn(force_full).await);
                    }
                    Some(SchedulerRequest::Shutdown) | None => {
                        info!("sync scheduler shutting down");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => {
                    match sync_fn(false).await {
                        Ok(SyncOutcome::Skipped) => debug!("periodic sync skipped, cycle already running"),
                        Ok(SyncOutcome::Completed(summary)) => debug!(?summary, "periodic sync complete"),
                        Err(err) => warn!(%err, "periodic sync failed"),
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
