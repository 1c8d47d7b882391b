// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle tasks driven by the task loop
//!
//! - [`StakeReadinessTask`]: `Prelaunch -> Staking` once the safety review has closed
//! - [`ExitSubmissionTask`]: signs voluntary exits and escrows them with the
//!   coordination service

mod exit;
pub mod policy;
mod stake;

pub use exit::{ExitSentCache, ExitSubmissionTask};
pub use policy::{must_force, submission_decision, SubmissionDecision};
pub use stake::StakeReadinessTask;

use alloy_primitives::Address;
use async_trait::async_trait;
use minipool_rpc::RpcError;
use minipool_types::{BlsPubkey, NetworkSnapshot};

use crate::batch_query::QueryError;

/// Errors that end a task run. The loop logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("No signing key for validator {0}")]
    MissingKey(BlsPubkey),

    #[error("Signing failed for validator {pubkey}: {reason}")]
    Signing { pubkey: BlsPubkey, reason: String },

    #[error("Simulation failed for minipool {minipool}: {reason}")]
    Simulation { minipool: Address, reason: String },

    #[error("Rejected by coordination service: {0}")]
    Rejected(String),
}

/// A unit of work run once per synced tick
#[async_trait]
pub trait ScheduledTask: Send {
    fn name(&self) -> &'static str;

    async fn run(&mut self, snapshot: &NetworkSnapshot) -> Result<(), TaskError>;
}
