//! Minipool Daemon - background lifecycle scheduler for a node's minipools
//!
//! The daemon keeps each minipool moving through its lifecycle without
//! manual intervention:
//! - Promoting prelaunch minipools to staking once their safety review closes
//! - Escrowing signed voluntary exits with the coordination service
//!
//! ## Module Structure
//!
//! - `batch_query` - Batched per-node contract reads pinned to one block
//! - `snapshot` - Network snapshot collection
//! - `tasks` - Scheduled tasks
//!   - `stake` - Stake-readiness task
//!   - `exit` - Exit-submission task
//!   - `policy` - Stake submission policy
//! - `task_loop` - Sync-gated scheduler loop with graceful shutdown
//! - `config` - Environment configuration

pub mod batch_query;
pub mod config;
pub mod snapshot;
pub mod task_loop;
pub mod tasks;

#[cfg(test)]
mod fixtures;

pub use batch_query::{
    BatchQueryExecutor, NodeQuery, NodeQueryResult, QueryContext, QueryError, QueryOutcome,
    Readiness,
};
pub use config::{DaemonConfig, PageSizes, StakePolicyConfig};
pub use snapshot::NetworkSnapshotCollector;
pub use task_loop::{Collaborators, TaskLoop, TaskLoopHandle, TickOutcome};
pub use tasks::{
    ExitSentCache, ExitSubmissionTask, ScheduledTask, StakeReadinessTask, SubmissionDecision,
    TaskError,
};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// `default_level`. Returns `false` if a subscriber was already installed.
pub fn init_logging(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
