//! Minipool validator records
//!
//! A [`ValidatorRecord`] is the node's view of one minipool: the on-chain
//! lifecycle fields read from the minipool contract plus, when known, the
//! validator's consensus-layer status. Records are rebuilt from chain state on
//! every scheduler tick; nothing here is written back locally.

use alloy_primitives::{Address, FixedBytes, B256};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::TypesError;

/// BLS12-381 public key (compressed G1 point)
pub type BlsPubkey = FixedBytes<48>;

/// BLS12-381 signature (compressed G2 point)
pub type BlsSignature = FixedBytes<96>;

/// Minipool lifecycle status as stored by the minipool contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinipoolStatus {
    /// Created, waiting for the protocol-side deposit
    #[default]
    Initialized,
    /// Deposited, inside the safety-review window or waiting to be staked
    Prelaunch,
    /// Fully staked on the consensus layer
    Staking,
    /// Launch timed out or scrubbed; funds returned
    Dissolved,
    /// Closed out by the node operator
    Finalized,
}

impl MinipoolStatus {
    /// Dissolved and finalized minipools never return to the beacon chain
    pub fn is_closed(&self) -> bool {
        matches!(self, MinipoolStatus::Dissolved | MinipoolStatus::Finalized)
    }
}

impl TryFrom<u8> for MinipoolStatus {
    type Error = TypesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MinipoolStatus::Initialized),
            1 => Ok(MinipoolStatus::Prelaunch),
            2 => Ok(MinipoolStatus::Staking),
            3 => Ok(MinipoolStatus::Dissolved),
            4 => Ok(MinipoolStatus::Finalized),
            other => Err(TypesError::UnknownStatus(other)),
        }
    }
}

impl From<MinipoolStatus> for u8 {
    fn from(status: MinipoolStatus) -> Self {
        status as u8
    }
}

/// Validator state as reported by the beacon node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconValidatorState {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

/// Consensus-layer view of a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconValidatorStatus {
    /// Validator index; `None` until the deposit has been processed
    pub index: Option<u64>,
    /// Current balance in gwei
    pub balance_gwei: u64,
    pub state: BeaconValidatorState,
}

/// One minipool owned by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    /// Owning node address
    pub node_address: Address,
    /// Minipool contract address
    pub minipool_address: Address,
    /// Whether the protocol still knows about this minipool
    pub exists: bool,
    pub status: MinipoolStatus,
    /// Time of the last status change
    pub status_time: SystemTime,
    pub pubkey: BlsPubkey,
    pub withdrawal_credentials: B256,
    /// Consensus-layer status, if it has been looked up
    pub beacon: Option<BeaconValidatorStatus>,
}

impl ValidatorRecord {
    /// Create an empty record for a minipool; fields are filled by batched reads
    pub fn new(node_address: Address, minipool_address: Address) -> Self {
        Self {
            node_address,
            minipool_address,
            exists: false,
            status: MinipoolStatus::Initialized,
            status_time: UNIX_EPOCH,
            pubkey: BlsPubkey::ZERO,
            withdrawal_credentials: B256::ZERO,
            beacon: None,
        }
    }

    /// Moment the safety-review (scrub) window closes
    pub fn safety_review_end(&self, scrub_period: Duration) -> SystemTime {
        self.status_time + scrub_period
    }

    /// A prelaunch minipool may be staked once its review window has closed.
    /// The boundary instant itself counts as closed.
    pub fn is_ready_to_stake(&self, block_time: SystemTime, scrub_period: Duration) -> bool {
        self.status == MinipoolStatus::Prelaunch && block_time >= self.safety_review_end(scrub_period)
    }

    /// Time left in the review window, zero once it has closed
    pub fn remaining_review(&self, block_time: SystemTime, scrub_period: Duration) -> Duration {
        self.safety_review_end(scrub_period)
            .duration_since(block_time)
            .unwrap_or(Duration::ZERO)
    }

    /// Beacon-chain index, once the status lookup has assigned one
    pub fn validator_index(&self) -> Option<u64> {
        self.beacon.as_ref().and_then(|status| status.index)
    }

    /// How long the minipool has been in its current status as of `block_time`
    pub fn time_in_status(&self, block_time: SystemTime) -> Duration {
        block_time.duration_since(self.status_time).unwrap_or(Duration::ZERO)
    }
}
