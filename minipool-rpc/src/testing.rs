//! In-memory collaborators for tests
//!
//! Each mock keeps its chain/service state behind a `parking_lot` lock and
//! records every side effect so tests can assert on what the scheduler did.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use minipool_types::{
    compute_domain, BeaconValidatorStatus, BlockHeader, BlsPubkey, DomainType, Epoch,
    ExitMessageUpload, MinipoolStatus, NetworkSettings, RemoteValidator, Slot, UploadOutcome,
    ValidatorRecord,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::consensus::{BeaconConfig, ChainHead, ConsensusClient};
use crate::coordination::CoordinationClient;
use crate::error::{Result, RpcError};
use crate::execution::{
    ContractRead, ContractRegistry, ExecutionClient, FeeEstimate, FeeSettings,
    GasEstimate, MinipoolField, ReadValue, SyncStatus, TransactionRequest, TxHash,
};
use crate::wallet::{Transactor, Wallet};

const STAKE_GAS: u64 = 180_000;

// ============================================
// Execution client
// ============================================

struct ChainState {
    header: BlockHeader,
    settings: NetworkSettings,
    minipools: Vec<ValidatorRecord>,
    fee: FeeEstimate,
    failing_simulations: HashSet<Address>,
    reported_count: Option<u64>,
}

/// A batch handed to `submit_batch`
#[derive(Debug, Clone)]
pub struct SubmittedBatch {
    pub txs: Vec<TransactionRequest>,
    pub fees: FeeSettings,
}

pub struct MockExecutionClient {
    state: Mutex<ChainState>,
    synced: AtomicBool,
    fail_reads: AtomicBool,
    multicalls: Mutex<Vec<(usize, u64)>>,
    refreshed: Mutex<Vec<ContractRegistry>>,
    simulated: Mutex<Vec<Address>>,
    submitted: Mutex<Vec<SubmittedBatch>>,
    waited: Mutex<Vec<TxHash>>,
    tx_counter: AtomicUsize,
}

impl MockExecutionClient {
    pub fn new(header: BlockHeader, settings: NetworkSettings) -> Self {
        Self {
            state: Mutex::new(ChainState {
                header,
                settings,
                minipools: Vec::new(),
                fee: FeeEstimate {
                    max_fee_per_gas_gwei: 20,
                    max_priority_fee_per_gas_gwei: 1,
                },
                failing_simulations: HashSet::new(),
                reported_count: None,
            }),
            synced: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            multicalls: Mutex::new(Vec::new()),
            refreshed: Mutex::new(Vec::new()),
            simulated: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
            tx_counter: AtomicUsize::new(0),
        }
    }

    pub fn add_minipool(&self, record: ValidatorRecord) {
        self.state.lock().minipools.push(record);
    }

    pub fn minipool(&self, address: Address) -> Option<ValidatorRecord> {
        self.state
            .lock()
            .minipools
            .iter()
            .find(|m| m.minipool_address == address)
            .cloned()
    }

    /// Move the chain head to a new block with the given timestamp
    pub fn advance_to(&self, timestamp: u64) {
        let mut state = self.state.lock();
        state.header.number += 1;
        state.header.timestamp = timestamp;
    }

    pub fn set_fee(&self, max_fee_per_gas_gwei: u64) {
        self.state.lock().fee.max_fee_per_gas_gwei = max_fee_per_gas_gwei;
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Report `count` minipools for every node regardless of what is stored
    pub fn report_minipool_count(&self, count: u64) {
        self.state.lock().reported_count = Some(count);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_simulation_for(&self, minipool: Address) {
        self.state.lock().failing_simulations.insert(minipool);
    }

    /// `(read count, block number)` of every multicall issued
    pub fn multicalls(&self) -> Vec<(usize, u64)> {
        self.multicalls.lock().clone()
    }

    pub fn refreshed(&self) -> Vec<ContractRegistry> {
        self.refreshed.lock().clone()
    }

    pub fn simulated(&self) -> Vec<Address> {
        self.simulated.lock().clone()
    }

    pub fn submitted(&self) -> Vec<SubmittedBatch> {
        self.submitted.lock().clone()
    }

    pub fn waited(&self) -> Vec<TxHash> {
        self.waited.lock().clone()
    }

    fn owned_by<'a>(state: &'a ChainState, node: &'a Address) -> impl Iterator<Item = &'a ValidatorRecord> + 'a {
        state.minipools.iter().filter(move |m| &m.node_address == node)
    }

    fn answer(state: &ChainState, read: &ContractRead) -> Result<ReadValue> {
        let value = match read {
            ContractRead::NodeActiveMinipoolCount { node } => {
                let active = Self::owned_by(state, node)
                    .filter(|m| m.status != MinipoolStatus::Finalized)
                    .count();
                ReadValue::Uint(U256::from(active as u64))
            }
            ContractRead::NodeMinipoolCount { node } => {
                let count = state
                    .reported_count
                    .unwrap_or_else(|| Self::owned_by(state, node).count() as u64);
                ReadValue::Uint(U256::from(count))
            }
            ContractRead::NodeMinipoolAt { node, index } => {
                let minipool = Self::owned_by(state, node)
                    .nth(*index as usize)
                    .ok_or_else(|| RpcError::Network(format!("minipool index {} out of range", index)))?;
                ReadValue::Address(minipool.minipool_address)
            }
            ContractRead::ScrubPeriod => ReadValue::Uint(U256::from(state.settings.scrub_period.as_secs())),
            ContractRead::LaunchTimeout => ReadValue::Uint(U256::from(state.settings.launch_timeout.as_secs())),
            ContractRead::MinimumStake => ReadValue::Uint(state.settings.minimum_stake),
            ContractRead::Minipool { minipool, field } => {
                let record = state.minipools.iter().find(|m| &m.minipool_address == minipool);
                match (field, record) {
                    (MinipoolField::Exists, record) => ReadValue::Bool(record.map(|r| r.exists).unwrap_or(false)),
                    (_, None) => ReadValue::Uint(U256::ZERO),
                    (MinipoolField::Status, Some(r)) => ReadValue::Uint(U256::from(u8::from(r.status))),
                    (MinipoolField::StatusTime, Some(r)) => {
                        let secs = r
                            .status_time
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .unwrap_or(0);
                        ReadValue::Uint(U256::from(secs))
                    }
                    (MinipoolField::Pubkey, Some(r)) => ReadValue::Bytes(r.pubkey.to_vec().into()),
                    (MinipoolField::WithdrawalCredentials, Some(r)) => {
                        ReadValue::Bytes(r.withdrawal_credentials.to_vec().into())
                    }
                }
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl ExecutionClient for MockExecutionClient {
    async fn sync_status(&self) -> Result<SyncStatus> {
        if self.synced.load(Ordering::SeqCst) {
            Ok(SyncStatus::synced())
        } else {
            Ok(SyncStatus::syncing(0.5))
        }
    }

    async fn header_by_number(&self, number: Option<u64>) -> Result<BlockHeader> {
        let header = self.state.lock().header;
        match number {
            None => Ok(header),
            Some(n) if n == header.number => Ok(header),
            Some(n) => Err(RpcError::Network(format!("block {} not available", n))),
        }
    }

    async fn refresh_contract_addresses(&self, registry: ContractRegistry) -> Result<()> {
        self.refreshed.lock().push(registry);
        Ok(())
    }

    async fn multicall(&self, reads: &[ContractRead], block: u64) -> Result<Vec<ReadValue>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RpcError::Network("multicall failed".to_string()));
        }
        self.multicalls.lock().push((reads.len(), block));
        let state = self.state.lock();
        reads.iter().map(|read| Self::answer(&state, read)).collect()
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        Ok(self.state.lock().fee)
    }

    async fn simulate(&self, _transactor: &Transactor, tx: &TransactionRequest) -> Result<GasEstimate> {
        self.simulated.lock().push(tx.to);
        if self.state.lock().failing_simulations.contains(&tx.to) {
            return Err(RpcError::Simulation(format!("execution reverted for {}", tx.to)));
        }
        Ok(GasEstimate { gas_limit: STAKE_GAS })
    }

    async fn submit_batch(
        &self,
        _transactor: &Transactor,
        txs: Vec<TransactionRequest>,
        fees: FeeSettings,
    ) -> Result<Vec<TxHash>> {
        let mut hashes = Vec::with_capacity(txs.len());
        {
            let mut state = self.state.lock();
            let block_time = state.header.time();
            for tx in &txs {
                if let Some(m) = state.minipools.iter_mut().find(|m| m.minipool_address == tx.to) {
                    m.status = MinipoolStatus::Staking;
                    m.status_time = block_time;
                }
                let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) as u64;
                hashes.push(B256::left_padding_from(&(n + 1).to_be_bytes()));
            }
        }
        self.submitted.lock().push(SubmittedBatch { txs, fees });
        Ok(hashes)
    }

    async fn wait_for_transactions(&self, hashes: &[TxHash]) -> Result<()> {
        self.waited.lock().extend_from_slice(hashes);
        Ok(())
    }
}

// ============================================
// Consensus client
// ============================================

pub struct MockConsensusClient {
    config: BeaconConfig,
    head: Mutex<ChainHead>,
    statuses: Mutex<HashMap<BlsPubkey, BeaconValidatorStatus>>,
    synced: AtomicBool,
    config_calls: AtomicUsize,
    status_queries: Mutex<Vec<(Vec<BlsPubkey>, Option<Slot>)>>,
}

impl MockConsensusClient {
    pub fn new(config: BeaconConfig) -> Self {
        Self {
            config,
            head: Mutex::new(ChainHead {
                head_slot: 0,
                finalized_epoch: 0,
            }),
            statuses: Mutex::new(HashMap::new()),
            synced: AtomicBool::new(true),
            config_calls: AtomicUsize::new(0),
            status_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, pubkey: BlsPubkey, status: BeaconValidatorStatus) {
        self.statuses.lock().insert(pubkey, status);
    }

    pub fn set_finalized_epoch(&self, epoch: Epoch) {
        let mut head = self.head.lock();
        head.finalized_epoch = epoch;
        head.head_slot = head.head_slot.max((epoch + 2) * self.config.slots_per_epoch);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> Vec<(Vec<BlsPubkey>, Option<Slot>)> {
        self.status_queries.lock().clone()
    }
}

#[async_trait]
impl ConsensusClient for MockConsensusClient {
    async fn sync_status(&self) -> Result<SyncStatus> {
        if self.synced.load(Ordering::SeqCst) {
            Ok(SyncStatus::synced())
        } else {
            Ok(SyncStatus::syncing(0.25))
        }
    }

    async fn protocol_config(&self) -> Result<BeaconConfig> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.config)
    }

    async fn validator_statuses(
        &self,
        pubkeys: &[BlsPubkey],
        slot: Option<Slot>,
    ) -> Result<HashMap<BlsPubkey, BeaconValidatorStatus>> {
        self.status_queries.lock().push((pubkeys.to_vec(), slot));
        let statuses = self.statuses.lock();
        Ok(pubkeys
            .iter()
            .filter_map(|pk| statuses.get(pk).map(|s| (*pk, s.clone())))
            .collect())
    }

    async fn chain_head(&self) -> Result<ChainHead> {
        Ok(*self.head.lock())
    }

    async fn signing_domain(&self, domain_type: DomainType, _epoch: Epoch) -> Result<B256> {
        Ok(compute_domain(domain_type, self.config.genesis_fork_version, B256::repeat_byte(0x4b)))
    }
}

// ============================================
// Coordination service
// ============================================

pub struct MockCoordinationClient {
    records: Mutex<HashMap<BlsPubkey, bool>>,
    outcome: Mutex<UploadOutcome>,
    unconfirmed: Mutex<HashSet<BlsPubkey>>,
    uploads: Mutex<Vec<Vec<ExitMessageUpload>>>,
    validator_queries: AtomicUsize,
    query_limit: AtomicUsize,
}

impl MockCoordinationClient {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            outcome: Mutex::new(UploadOutcome::default()),
            unconfirmed: Mutex::new(HashSet::new()),
            uploads: Mutex::new(Vec::new()),
            validator_queries: AtomicUsize::new(0),
            query_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// Register a validator with the service, as if uploaded out of band when `uploaded`
    pub fn set_validator(&self, pubkey: BlsPubkey, uploaded: bool) {
        self.records.lock().insert(pubkey, uploaded);
    }

    /// Make every upload come back with this outcome
    pub fn set_outcome(&self, outcome: UploadOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Accept uploads for `pubkey` without recording them
    pub fn drop_uploads_for(&self, pubkey: BlsPubkey) {
        self.unconfirmed.lock().insert(pubkey);
    }

    /// Answer the first `count` validator listings, then fail with a network error
    pub fn fail_validator_queries_after(&self, count: usize) {
        self.query_limit.store(count, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<Vec<ExitMessageUpload>> {
        self.uploads.lock().clone()
    }

    pub fn validator_queries(&self) -> usize {
        self.validator_queries.load(Ordering::SeqCst)
    }
}

impl Default for MockCoordinationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationClient for MockCoordinationClient {
    async fn validators(&self) -> Result<Vec<RemoteValidator>> {
        let previous = self.validator_queries.fetch_add(1, Ordering::SeqCst);
        if previous >= self.query_limit.load(Ordering::SeqCst) {
            return Err(RpcError::Network("coordination service timed out".to_string()));
        }
        let mut validators: Vec<_> = self
            .records
            .lock()
            .iter()
            .map(|(pubkey, uploaded)| RemoteValidator {
                pubkey: *pubkey,
                exit_message_uploaded: *uploaded,
            })
            .collect();
        validators.sort_by(|a, b| a.pubkey.cmp(&b.pubkey));
        Ok(validators)
    }

    async fn upload_signed_exits(&self, exits: Vec<ExitMessageUpload>) -> Result<UploadOutcome> {
        self.uploads.lock().push(exits.clone());
        let outcome = *self.outcome.lock();
        if !outcome.is_accepted() {
            return Ok(outcome);
        }
        let unconfirmed = self.unconfirmed.lock();
        let mut records = self.records.lock();
        for exit in exits.iter().filter(|e| !unconfirmed.contains(&e.pubkey)) {
            records.insert(exit.pubkey, true);
        }
        Ok(outcome)
    }
}

// ============================================
// Wallet
// ============================================

pub struct MockWallet {
    node_address: Address,
    chain_id: u64,
    ready: AtomicBool,
}

impl MockWallet {
    pub fn new(node_address: Address) -> Self {
        Self {
            node_address,
            chain_id: 17000,
            ready: AtomicBool::new(true),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn node_address(&self) -> Address {
        self.node_address
    }

    async fn transactor(&self) -> Result<Transactor> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(RpcError::WalletNotReady("wallet is locked".to_string()));
        }
        Ok(Transactor {
            from: self.node_address,
            chain_id: self.chain_id,
        })
    }
}
