//! Shared fixtures for unit tests

use alloy_primitives::{Address, B256, U256};
use minipool_rpc::testing::{MockConsensusClient, MockCoordinationClient, MockExecutionClient, MockWallet};
use minipool_rpc::{BeaconConfig, InMemoryKeyStore};
use minipool_types::{
    BeaconValidatorState, BeaconValidatorStatus, BlockHeader, ForkVersion, MinipoolStatus,
    NetworkSettings, ValidatorKey, ValidatorRecord,
};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use crate::batch_query::BatchQueryExecutor;
use crate::config::PageSizes;

pub const DAY: u64 = 24 * 60 * 60;
pub const T0: u64 = 1_700_000_000;
pub const GENESIS_TIME: u64 = 1_695_902_400;

pub fn node() -> Address {
    Address::repeat_byte(0x11)
}

pub fn minipool(n: u8) -> Address {
    Address::repeat_byte(0xa0 + n)
}

pub fn header(timestamp: u64) -> BlockHeader {
    BlockHeader {
        number: 1_000,
        hash: B256::repeat_byte(0x22),
        timestamp,
    }
}

pub fn settings() -> NetworkSettings {
    NetworkSettings {
        scrub_period: Duration::from_secs(5 * DAY),
        launch_timeout: Duration::from_secs(14 * DAY),
        minimum_stake: U256::from(10u64),
    }
}

pub fn beacon_config() -> BeaconConfig {
    BeaconConfig {
        genesis_time: GENESIS_TIME,
        seconds_per_slot: 12,
        slots_per_epoch: 32,
        genesis_fork_version: ForkVersion::ZERO,
    }
}

pub fn key(n: u8) -> ValidatorKey {
    ValidatorKey::from_seed(&[n; 32]).unwrap()
}

pub fn record(n: u8, status: MinipoolStatus, status_time: u64) -> ValidatorRecord {
    let mut r = ValidatorRecord::new(node(), minipool(n));
    r.exists = true;
    r.status = status;
    r.status_time = UNIX_EPOCH + Duration::from_secs(status_time);
    r.pubkey = key(n).pubkey();
    r.withdrawal_credentials = B256::left_padding_from(minipool(n).as_slice());
    r
}

pub fn active(index: u64) -> BeaconValidatorStatus {
    BeaconValidatorStatus {
        index: Some(index),
        balance_gwei: 32_000_000_000,
        state: BeaconValidatorState::ActiveOngoing,
    }
}

pub struct Harness {
    pub execution: Arc<MockExecutionClient>,
    pub consensus: Arc<MockConsensusClient>,
    pub coordination: Arc<MockCoordinationClient>,
    pub wallet: Arc<MockWallet>,
    pub keystore: Arc<InMemoryKeyStore>,
}

impl Harness {
    pub fn new(block_time: u64) -> Self {
        Self {
            execution: Arc::new(MockExecutionClient::new(header(block_time), settings())),
            consensus: Arc::new(MockConsensusClient::new(beacon_config())),
            coordination: Arc::new(MockCoordinationClient::new()),
            wallet: Arc::new(MockWallet::new(node())),
            keystore: Arc::new(InMemoryKeyStore::new()),
        }
    }

    /// Add a minipool on chain and its key to the key store
    pub fn add(&self, record: ValidatorRecord, key_seed: u8) {
        self.keystore.insert(&key(key_seed));
        self.execution.add_minipool(record);
    }

    pub fn executor(&self, page_sizes: PageSizes) -> Arc<BatchQueryExecutor> {
        Arc::new(BatchQueryExecutor::new(
            self.execution.clone(),
            self.wallet.clone(),
            page_sizes,
        ))
    }
}
