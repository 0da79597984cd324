//! Role-based process lifecycle.
//!
//! Selects which background loops to run based on `Pipeline.Role` (spec
//! §5): a `Poller` process only discovers and enqueues, a `Worker` process
//! only dequeues and orchestrates, `All` runs both in the same process.
//! Every loop is cancelled together on shutdown, and the health endpoint
//! flips ready only once the selected loops are up.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Role;
use crate::health::{self, HealthState};
use crate::orchestrator::Orchestrator;
use crate::poller::Poller;
use crate::FileHorizonConfig;

pub struct Runtime {
    pub config: FileHorizonConfig,
    pub poller: Option<Arc<Poller>>,
    pub orchestrator: Option<Arc<Orchestrator>>,
    pub health_state: HealthState,
}

impl Runtime {
    /// Runs the process's selected loops until `shutdown` is cancelled,
    /// draining in-flight work up to `drain_deadline` before returning.
    pub async fn run(self, shutdown: CancellationToken, drain_deadline: Duration) {
        let mut handles = Vec::new();

        if matches!(self.config.pipeline.role, Role::Poller | Role::All) {
            if let Some(poller) = self.poller.clone() {
                let token = shutdown.clone();
                let interval = self.config.polling_interval();
                handles.push(tokio::spawn(async move {
                    run_poll_loop(poller, interval, token).await;
                }));
            }
        }

        if matches!(self.config.pipeline.role, Role::Worker | Role::All) {
            if let Some(orchestrator) = self.orchestrator.clone() {
                let token = shutdown.clone();
                let batch = self.config.polling.batch_read_limit;
                handles.push(tokio::spawn(async move {
                    run_worker_loop(orchestrator, batch, token).await;
                }));
            }
        }

        let health_token = shutdown.clone();
        let health_config = self.config.health.clone();
        let health_state = self.health_state.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = health::serve(&health_config, health_state, health_token).await {
                tracing::error!(error = %err, "health endpoint exited with error");
            }
        }));

        self.health_state.mark_ready();
        tracing::info!(role = ?self.config.pipeline.role, "filehorizon runtime started");

        shutdown.cancelled().await;
        tracing::info!("shutdown signal received, draining in-flight work");

        let _ = tokio::time::timeout(drain_deadline, futures::future::join_all(handles)).await;
    }
}

async fn run_poll_loop(poller: Arc<Poller>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                poller.poll_once().await;
            }
        }
    }
}

async fn run_worker_loop(orchestrator: Arc<Orchestrator>, batch: usize, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = orchestrator.run_once(batch) => {
                match result {
                    Ok(0) => {
                        if let Err(err) = orchestrator.reclaim_and_process().await {
                            tracing::warn!(error = %err, "reclaim pass failed");
                        }
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "worker batch failed");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                }
            }
        }
    }
}
