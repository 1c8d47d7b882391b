//! Chain-level settings and point-in-time network snapshots

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::validator::{MinipoolStatus, ValidatorRecord};

/// Execution-layer block header fields the scheduler pins its reads to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    /// Block timestamp in seconds since the Unix epoch
    pub timestamp: u64,
}

impl BlockHeader {
    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.timestamp)
    }
}

/// Protocol-wide minipool policy values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Mandatory safety-review (scrub) window after the prelaunch deposit
    pub scrub_period: Duration,
    /// Maximum time a minipool may stay in prelaunch before it can be dissolved
    pub launch_timeout: Duration,
    /// Minimum stake value, in wei
    pub minimum_stake: U256,
}

/// Immutable view of the network and one node's minipools at a single block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub header: BlockHeader,
    pub settings: NetworkSettings,
    pub node_address: Address,
    /// Number of minipools the protocol counts as active for this node
    pub active_minipool_count: u64,
    pub validators: Vec<ValidatorRecord>,
}

impl NetworkSnapshot {
    pub fn block_time(&self) -> SystemTime {
        self.header.time()
    }

    /// Minipools currently in prelaunch
    pub fn prelaunch(&self) -> impl Iterator<Item = &ValidatorRecord> {
        self.validators
            .iter()
            .filter(|v| v.status == MinipoolStatus::Prelaunch)
    }

    /// Prelaunch minipools whose safety-review window has closed at this block,
    /// in snapshot order
    pub fn stake_candidates(&self) -> Vec<&ValidatorRecord> {
        stake_candidates(&self.validators, self.block_time(), self.settings.scrub_period)
    }
}

/// Prelaunch minipools whose safety-review window has closed at `block_time`.
/// Order follows `validators`.
pub fn stake_candidates(
    validators: &[ValidatorRecord],
    block_time: SystemTime,
    scrub_period: Duration,
) -> Vec<&ValidatorRecord> {
    validators
        .iter()
        .filter(|v| v.is_ready_to_stake(block_time, scrub_period))
        .collect()
}
