//! Integration tests for the task loop driving both lifecycle tasks

use alloy_primitives::{Address, B256, U256};
use minipool_daemon::{init_logging, Collaborators, DaemonConfig, TaskLoop, TickOutcome};
use minipool_rpc::testing::{MockConsensusClient, MockCoordinationClient, MockExecutionClient, MockWallet};
use minipool_rpc::{BeaconConfig, InMemoryKeyStore};
use minipool_types::{
    BeaconValidatorState, BeaconValidatorStatus, BlockHeader, BlsPubkey, ForkVersion, MinipoolStatus,
    NetworkSettings, UploadOutcome, ValidatorKey, ValidatorRecord,
};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

const DAY: u64 = 24 * 60 * 60;
const T0: u64 = 1_700_000_000;

fn node_address() -> Address {
    Address::repeat_byte(0x42)
}

fn key(n: u8) -> ValidatorKey {
    ValidatorKey::from_seed(&[n; 32]).unwrap()
}

/// A node and its mocked collaborators
struct TestNode {
    execution: Arc<MockExecutionClient>,
    consensus: Arc<MockConsensusClient>,
    coordination: Arc<MockCoordinationClient>,
    wallet: Arc<MockWallet>,
    keystore: Arc<InMemoryKeyStore>,
}

impl TestNode {
    fn new(block_time: u64) -> Self {
        let header = BlockHeader {
            number: 18_500_000,
            hash: B256::repeat_byte(0x01),
            timestamp: block_time,
        };
        let settings = NetworkSettings {
            scrub_period: Duration::from_secs(5 * DAY),
            launch_timeout: Duration::from_secs(14 * DAY),
            minimum_stake: U256::from(1_000u64),
        };
        let beacon = BeaconConfig {
            genesis_time: 1_606_824_023,
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            genesis_fork_version: ForkVersion::ZERO,
        };

        let node = Self {
            execution: Arc::new(MockExecutionClient::new(header, settings)),
            consensus: Arc::new(MockConsensusClient::new(beacon)),
            coordination: Arc::new(MockCoordinationClient::new()),
            wallet: Arc::new(MockWallet::new(node_address())),
            keystore: Arc::new(InMemoryKeyStore::new()),
        };
        node.consensus.set_finalized_epoch(250_000);
        node
    }

    /// Create minipool `n` with its key held locally and the service aware of it
    fn add_minipool(&self, n: u8, status: MinipoolStatus, status_time: u64) -> (Address, BlsPubkey) {
        let minipool = Address::repeat_byte(0x80 + n);
        let pubkey = self.keystore.insert(&key(n));

        let mut record = ValidatorRecord::new(node_address(), minipool);
        record.exists = true;
        record.status = status;
        record.status_time = UNIX_EPOCH + Duration::from_secs(status_time);
        record.pubkey = pubkey;
        record.withdrawal_credentials = B256::left_padding_from(minipool.as_slice());
        self.execution.add_minipool(record);
        self.coordination.set_validator(pubkey, false);

        (minipool, pubkey)
    }

    fn activate(&self, pubkey: BlsPubkey, index: u64) {
        self.consensus.set_status(
            pubkey,
            BeaconValidatorStatus {
                index: Some(index),
                balance_gwei: 32_000_000_000,
                state: BeaconValidatorState::ActiveOngoing,
            },
        );
    }

    fn task_loop(&self, config: &DaemonConfig) -> TaskLoop {
        TaskLoop::from_config(
            config,
            Collaborators {
                execution: self.execution.clone(),
                consensus: self.consensus.clone(),
                coordination: self.coordination.clone(),
                wallet: self.wallet.clone(),
                keystore: self.keystore.clone(),
            },
        )
    }
}

#[tokio::test]
async fn test_minipool_lifecycle_across_ticks() {
    init_logging("debug");

    let node = TestNode::new(T0 + 4 * DAY);
    let (minipool, pubkey) = node.add_minipool(1, MinipoolStatus::Prelaunch, T0);
    let mut task_loop = node.task_loop(&DaemonConfig::default());

    // Still in the safety review and unknown to the beacon chain
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert!(node.execution.submitted().is_empty());
    assert!(node.coordination.uploads().is_empty());

    // Review closed: staked in this tick
    node.execution.advance_to(T0 + 5 * DAY + 1);
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(node.execution.submitted().len(), 1);
    assert_eq!(node.execution.minipool(minipool).unwrap().status, MinipoolStatus::Staking);

    // Deposit processed by the beacon chain: exit escrowed once
    node.activate(pubkey, 412_345);
    node.execution.advance_to(T0 + 6 * DAY);
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    let uploads = node.coordination.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0][0].pubkey, pubkey);
    assert_eq!(uploads[0][0].exit_message.message.validator_index, 412_345);
    assert_eq!(uploads[0][0].exit_message.message.epoch, 250_000);

    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(node.coordination.uploads().len(), 1);
    assert_eq!(node.execution.submitted().len(), 1);
}

#[tokio::test]
async fn test_tasks_wait_for_both_clients() {
    let node = TestNode::new(T0 + 6 * DAY);
    node.add_minipool(1, MinipoolStatus::Prelaunch, T0);
    let mut task_loop = node.task_loop(&DaemonConfig::default());

    node.execution.set_synced(false);
    assert_eq!(task_loop.tick().await, TickOutcome::ExecutionNotSynced);

    node.execution.set_synced(true);
    node.consensus.set_synced(false);
    assert_eq!(task_loop.tick().await, TickOutcome::ConsensusNotSynced);
    assert!(node.execution.multicalls().is_empty());
    assert!(node.execution.submitted().is_empty());

    node.consensus.set_synced(true);
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(node.execution.submitted().len(), 1);
}

#[tokio::test]
async fn test_rejected_upload_fails_task_but_not_loop() {
    let node = TestNode::new(T0);
    let (_, pubkey) = node.add_minipool(1, MinipoolStatus::Staking, T0 - 60 * DAY);
    node.activate(pubkey, 9);
    node.coordination.set_outcome(UploadOutcome {
        not_registered: true,
        not_authorized: false,
    });
    let mut task_loop = node.task_loop(&DaemonConfig::default());

    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 1 });
    // Nothing was cached, so the next tick tries again
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 1 });
    assert_eq!(node.coordination.uploads().len(), 2);

    node.coordination.set_outcome(UploadOutcome::default());
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(node.coordination.uploads().len(), 3);
}

#[tokio::test]
async fn test_locked_wallet_only_delays_staking() {
    let node = TestNode::new(T0 + 6 * DAY);
    node.add_minipool(1, MinipoolStatus::Prelaunch, T0);
    node.wallet.set_ready(false);
    let mut task_loop = node.task_loop(&DaemonConfig::default());

    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert!(node.execution.submitted().is_empty());

    node.wallet.set_ready(true);
    assert_eq!(task_loop.tick().await, TickOutcome::Completed { failed_tasks: 0 });
    assert_eq!(node.execution.submitted().len(), 1);
}

#[tokio::test]
async fn test_spawned_loop_runs_until_shutdown() {
    let node = TestNode::new(T0);
    let (_, pubkey) = node.add_minipool(1, MinipoolStatus::Staking, T0 - 60 * DAY);
    node.activate(pubkey, 17);

    let config = DaemonConfig {
        task_interval: Duration::from_millis(20),
        sync_cooldown: Duration::from_millis(20),
        ..DaemonConfig::default()
    };
    config.validate().unwrap();
    let handle = node.task_loop(&config).spawn();

    let uploaded = tokio::time::timeout(Duration::from_secs(5), async {
        while node.coordination.uploads().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(uploaded.is_ok());

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .unwrap();
    assert_eq!(node.coordination.uploads().len(), 1);
}
