// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Task loop
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ execution client synced?     │── no ──► sleep(sync_cooldown) ─┐
//! │ consensus client synced?     │── no ──► sleep(sync_cooldown) ─┤
//! └──────────────┬───────────────┘                                │
//!                ▼ yes                                            │
//!    collect NetworkSnapshot                                      │
//!                ▼                                                │
//!    run every ScheduledTask in order                             │
//!                ▼                                                │
//!    sleep(task_interval) ────────────────────────────────────────┘
//! ```
//!
//! Both sleeps and the tick itself give way to the shutdown signal. The signal
//! is a [`Notify`] permit, so a shutdown requested mid-tick is not lost.

use minipool_rpc::{ConsensusClient, CoordinationClient, ExecutionClient, KeyStore, Wallet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::batch_query::BatchQueryExecutor;
use crate::config::DaemonConfig;
use crate::snapshot::NetworkSnapshotCollector;
use crate::tasks::{ExitSubmissionTask, ScheduledTask, StakeReadinessTask};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    ExecutionNotSynced,
    ConsensusNotSynced,
    /// Clients were synced but the snapshot could not be collected
    SnapshotFailed,
    Completed { failed_tasks: usize },
}

impl TickOutcome {
    fn waiting_for_sync(&self) -> bool {
        matches!(self, TickOutcome::ExecutionNotSynced | TickOutcome::ConsensusNotSynced)
    }
}

/// External collaborators the daemon is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub execution: Arc<dyn ExecutionClient>,
    pub consensus: Arc<dyn ConsensusClient>,
    pub coordination: Arc<dyn CoordinationClient>,
    pub wallet: Arc<dyn Wallet>,
    pub keystore: Arc<dyn KeyStore>,
}

pub struct TaskLoop {
    execution: Arc<dyn ExecutionClient>,
    consensus: Arc<dyn ConsensusClient>,
    collector: NetworkSnapshotCollector,
    tasks: Vec<Box<dyn ScheduledTask>>,
    task_interval: Duration,
    sync_cooldown: Duration,
}

impl TaskLoop {
    /// An empty loop; register tasks with [`TaskLoop::with_task`]
    pub fn new(
        execution: Arc<dyn ExecutionClient>,
        consensus: Arc<dyn ConsensusClient>,
        collector: NetworkSnapshotCollector,
        task_interval: Duration,
        sync_cooldown: Duration,
    ) -> Self {
        Self {
            execution,
            consensus,
            collector,
            tasks: Vec::new(),
            task_interval,
            sync_cooldown,
        }
    }

    /// The standard loop: stake readiness, then exit submission
    pub fn from_config(config: &DaemonConfig, collaborators: Collaborators) -> Self {
        let executor = Arc::new(BatchQueryExecutor::new(
            collaborators.execution.clone(),
            collaborators.wallet.clone(),
            config.page_sizes,
        ));

        let stake = StakeReadinessTask::new(
            executor.clone(),
            collaborators.execution.clone(),
            collaborators.consensus.clone(),
            collaborators.keystore.clone(),
            config.stake_policy,
        );
        let exit = ExitSubmissionTask::new(
            collaborators.consensus.clone(),
            collaborators.coordination,
            collaborators.keystore,
        );

        Self::new(
            collaborators.execution,
            collaborators.consensus,
            NetworkSnapshotCollector::new(executor),
            config.task_interval,
            config.sync_cooldown,
        )
        .with_task(Box::new(stake))
        .with_task(Box::new(exit))
    }

    pub fn with_task(mut self, task: Box<dyn ScheduledTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// One pass: sync checks, snapshot, then every task in order
    pub async fn tick(&mut self) -> TickOutcome {
        match self.execution.sync_status().await {
            Ok(status) if status.is_synced => {}
            Ok(status) => {
                info!(progress = status.progress, "Execution client not synced");
                return TickOutcome::ExecutionNotSynced;
            }
            Err(e) => {
                warn!(error = %e, "Failed to check execution client sync status");
                return TickOutcome::ExecutionNotSynced;
            }
        }

        match self.consensus.sync_status().await {
            Ok(status) if status.is_synced => {}
            Ok(status) => {
                info!(progress = status.progress, "Consensus client not synced");
                return TickOutcome::ConsensusNotSynced;
            }
            Err(e) => {
                warn!(error = %e, "Failed to check consensus client sync status");
                return TickOutcome::ConsensusNotSynced;
            }
        }

        let snapshot = match self.collector.collect().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to collect network snapshot");
                return TickOutcome::SnapshotFailed;
            }
        };

        let mut failed_tasks = 0;
        for task in self.tasks.iter_mut() {
            debug!(task = task.name(), block = snapshot.header.number, "Running task");
            if let Err(e) = task.run(&snapshot).await {
                error!(task = task.name(), error = %e, "Task failed");
                failed_tasks += 1;
            }
        }

        TickOutcome::Completed { failed_tasks }
    }

    /// Run until `shutdown` is notified
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        info!(
            tasks = ?self.task_names(),
            interval_secs = self.task_interval.as_secs(),
            "Task loop started"
        );

        loop {
            let outcome = tokio::select! {
                _ = shutdown.notified() => break,
                outcome = self.tick() => outcome,
            };

            let pause = if outcome.waiting_for_sync() {
                self.sync_cooldown
            } else {
                self.task_interval
            };

            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Task loop stopped");
    }

    /// Start the loop on the runtime
    pub fn spawn(self) -> TaskLoopHandle {
        let shutdown = Arc::new(Notify::new());
        let join = tokio::spawn(self.run(shutdown.clone()));
        TaskLoopHandle { shutdown, join }
    }
}

/// Owner's handle on a spawned [`TaskLoop`]
pub struct TaskLoopHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl TaskLoopHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the loop and wait until it has fully exited
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            error!(error = %e, "Task loop ended abnormally");
        }
    }
}
