//! Execution-layer client contract
//!
//! Reads are expressed as typed [`ContractRead`]s so a batch of them can be
//! bundled into one multicall round trip; the client returns one
//! [`ReadValue`] per read, in request order. Transactions go through a
//! black-box transaction manager: simulate, submit a batch, wait for
//! inclusion.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use minipool_types::{BlockHeader, BlsPubkey, BlsSignature};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};
use crate::wallet::Transactor;

/// Transaction hash
pub type TxHash = B256;

/// Sync state reported by a chain client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_synced: bool,
    /// Progress in `[0, 1]`
    pub progress: f64,
}

impl SyncStatus {
    pub fn synced() -> Self {
        Self { is_synced: true, progress: 1.0 }
    }

    pub fn syncing(progress: f64) -> Self {
        Self { is_synced: false, progress }
    }
}

/// Contract-address caches kept by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractRegistry {
    /// Base protocol contracts (deposit contract, etc.)
    Execution,
    /// Liquid-staking protocol contracts (minipool manager, settings, etc.)
    Protocol,
}

/// Per-minipool contract fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinipoolField {
    Exists,
    Status,
    StatusTime,
    Pubkey,
    WithdrawalCredentials,
}

/// A single contract view call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractRead {
    /// Number of active minipools owned by a node
    NodeActiveMinipoolCount { node: Address },
    /// Total number of minipools owned by a node
    NodeMinipoolCount { node: Address },
    /// Address of the node's minipool at `index`
    NodeMinipoolAt { node: Address, index: u64 },
    /// Scrub period in seconds
    ScrubPeriod,
    /// Launch timeout in seconds
    LaunchTimeout,
    /// Minimum stake value in wei
    MinimumStake,
    Minipool { minipool: Address, field: MinipoolField },
}

/// Decoded return value of a [`ContractRead`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadValue {
    Bool(bool),
    Uint(U256),
    Address(Address),
    Bytes(Bytes),
}

impl ReadValue {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            ReadValue::Bool(b) => Ok(*b),
            other => Err(RpcError::Decode(format!("expected bool, got {:?}", other))),
        }
    }

    pub fn as_uint(&self) -> Result<U256> {
        match self {
            ReadValue::Uint(v) => Ok(*v),
            other => Err(RpcError::Decode(format!("expected uint, got {:?}", other))),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        let value = self.as_uint()?;
        u64::try_from(value).map_err(|_| RpcError::Decode(format!("uint {} overflows u64", value)))
    }

    pub fn as_u8(&self) -> Result<u8> {
        let value = self.as_uint()?;
        u8::try_from(value).map_err(|_| RpcError::Decode(format!("uint {} overflows u8", value)))
    }

    pub fn as_address(&self) -> Result<Address> {
        match self {
            ReadValue::Address(a) => Ok(*a),
            other => Err(RpcError::Decode(format!("expected address, got {:?}", other))),
        }
    }

    pub fn as_bytes(&self) -> Result<&Bytes> {
        match self {
            ReadValue::Bytes(b) => Ok(b),
            other => Err(RpcError::Decode(format!("expected bytes, got {:?}", other))),
        }
    }

    pub fn as_b256(&self) -> Result<B256> {
        let bytes = self.as_bytes()?;
        if bytes.len() != 32 {
            return Err(RpcError::Decode(format!("expected 32 bytes, got {}", bytes.len())));
        }
        Ok(B256::from_slice(bytes))
    }

    pub fn as_pubkey(&self) -> Result<BlsPubkey> {
        let bytes = self.as_bytes()?;
        if bytes.len() != 48 {
            return Err(RpcError::Decode(format!("expected 48-byte pubkey, got {}", bytes.len())));
        }
        Ok(BlsPubkey::from_slice(bytes))
    }
}

/// Calls the scheduler sends as transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Move a prelaunch minipool to staking with its remaining deposit
    Stake {
        validator_signature: BlsSignature,
        deposit_data_root: B256,
    },
}

/// A transaction ready for simulation and submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: Address,
    pub call: ContractCall,
    /// Filled from simulation when absent
    pub gas_limit: Option<u64>,
}

/// Result of a dry run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    pub gas_limit: u64,
}

/// Current network fee estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub max_fee_per_gas_gwei: u64,
    pub max_priority_fee_per_gas_gwei: u64,
}

/// Fees a batch is submitted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSettings {
    pub max_fee_per_gas_gwei: u64,
    pub max_priority_fee_per_gas_gwei: u64,
}

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Re-query the client's sync state, bypassing any cached value
    async fn sync_status(&self) -> Result<SyncStatus>;

    /// Header of block `number`, or of the latest block for `None`
    async fn header_by_number(&self, number: Option<u64>) -> Result<BlockHeader>;

    /// Reload a contract-address cache if it is stale
    async fn refresh_contract_addresses(&self, registry: ContractRegistry) -> Result<()>;

    /// Execute all reads in one round trip against block `block`
    async fn multicall(&self, reads: &[ContractRead], block: u64) -> Result<Vec<ReadValue>>;

    async fn fee_estimate(&self) -> Result<FeeEstimate>;

    /// Dry-run a transaction; fails with [`RpcError::Simulation`] if it would revert
    async fn simulate(&self, transactor: &Transactor, tx: &TransactionRequest) -> Result<GasEstimate>;

    async fn submit_batch(
        &self,
        transactor: &Transactor,
        txs: Vec<TransactionRequest>,
        fees: FeeSettings,
    ) -> Result<Vec<TxHash>>;

    /// Block until every transaction has been included
    async fn wait_for_transactions(&self, hashes: &[TxHash]) -> Result<()>;
}
