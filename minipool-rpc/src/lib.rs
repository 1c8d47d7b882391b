//! Minipool RPC - contracts of the daemon's external collaborators
//!
//! This crate defines how the scheduler talks to:
//! - the execution-layer client (batched contract reads, transactions)
//! - the consensus-layer client (validator statuses, chain head, domains)
//! - the remote coordination service (exit-message escrow)
//! - the local validator key store and the node wallet
//!
//! Concrete network clients live outside this workspace; the `testing`
//! module (feature `test-utils`) provides in-memory stand-ins.

pub mod consensus;
pub mod coordination;
pub mod error;
pub mod execution;
pub mod keystore;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use consensus::{BeaconConfig, ChainHead, ConsensusClient};
pub use coordination::CoordinationClient;
pub use error::{Result, RpcError};
pub use execution::{
    ContractCall, ContractRead, ContractRegistry, ExecutionClient, FeeEstimate, FeeSettings,
    GasEstimate, MinipoolField, ReadValue, SyncStatus, TransactionRequest, TxHash,
};
pub use keystore::{InMemoryKeyStore, KeyStore};
pub use wallet::{Transactor, Wallet};
