// Message scheduler: owned polling loop around DispatchJob

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::dispatch::{DispatchJob, DispatchRunResult};
use crate::error::AutomationResult;

const RUN_LOG_CAP: usize = 100;

#[derive(Debug, Clone)]
pub struct DispatchRunLog {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub result: DispatchRunResult,
}

/// Owns the repeating dispatch timer. Start and stop are explicit and
/// idempotent; both return whether they changed anything. Stopping only
/// prevents future ticks; a sweep already in flight runs to completion.
pub struct MessageScheduler {
    job: Arc<DispatchJob>,
    poll_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    run_log: Arc<RwLock<Vec<DispatchRunLog>>>,
}

impl MessageScheduler {
    pub fn new(job: DispatchJob, poll_interval: Duration) -> Self {
        Self {
            job: Arc::new(job),
            poll_interval,
            shutdown: Mutex::new(None),
            run_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Spawn the polling loop. Returns false without side effects when the
    /// scheduler is already running.
    pub fn start(&self) -> bool {
        let mut guard = match self.shutdown.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if guard.is_some() {
            return false;
        }

        let (tx, mut rx) = watch::channel(false);
        let job = self.job.clone();
        let run_log = self.run_log.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so a fresh
            // start waits one full interval before the first sweep.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let started_at = Utc::now();
                        match job.run().await {
                            Ok(result) => {
                                let mut log = run_log.write().await;
                                log.push(DispatchRunLog {
                                    started_at,
                                    completed_at: Utc::now(),
                                    result,
                                });
                                if log.len() > RUN_LOG_CAP {
                                    log.remove(0);
                                }
                            }
                            Err(e) => {
                                error!("Dispatch sweep failed: {}", e);
                            }
                        }
                    }
                    _ = rx.changed() => break,
                }
            }

            info!("Message scheduler stopped");
        });

        *guard = Some(tx);
        info!(
            "Message scheduler started (every {}s)",
            poll_interval.as_secs()
        );
        true
    }

    /// Signal the loop to exit after any sweep currently in flight. Returns
    /// false when the scheduler is not running.
    pub fn stop(&self) -> bool {
        let mut guard = match self.shutdown.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        match guard.take() {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Run one sweep immediately, outside the timer.
    pub async fn run_now(&self) -> AutomationResult<DispatchRunResult> {
        self.job.run().await
    }

    /// The most recent sweeps, oldest first.
    pub async fn recent_runs(&self) -> Vec<DispatchRunLog> {
        self.run_log.read().await.clone()
    }
}
