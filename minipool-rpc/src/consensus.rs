//! Consensus-layer (beacon) client contract

use alloy_primitives::B256;
use async_trait::async_trait;
use minipool_types::{BeaconValidatorStatus, BlsPubkey, DomainType, Epoch, ForkVersion, Slot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::execution::SyncStatus;

/// Beacon chain constants that never change for a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Genesis time in seconds since the Unix epoch
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub genesis_fork_version: ForkVersion,
}

impl BeaconConfig {
    /// Slot in progress at `time`; times before genesis map to slot 0
    pub fn slot_at(&self, time: SystemTime) -> Slot {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs();
        if self.seconds_per_slot == 0 {
            return 0;
        }
        since_epoch.saturating_sub(self.genesis_time) / self.seconds_per_slot
    }
}

/// Head of the beacon chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub head_slot: Slot,
    pub finalized_epoch: Epoch,
}

#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Re-query the client's sync state, bypassing any cached value
    async fn sync_status(&self) -> Result<SyncStatus>;

    async fn protocol_config(&self) -> Result<BeaconConfig>;

    /// Statuses of the given validators at `slot` (head when `None`).
    /// Validators the beacon chain has not seen are absent from the map.
    async fn validator_statuses(
        &self,
        pubkeys: &[BlsPubkey],
        slot: Option<Slot>,
    ) -> Result<HashMap<BlsPubkey, BeaconValidatorStatus>>;

    async fn chain_head(&self) -> Result<ChainHead>;

    /// Signature domain for `domain_type` at `epoch`
    async fn signing_domain(&self, domain_type: DomainType, epoch: Epoch) -> Result<B256>;
}
