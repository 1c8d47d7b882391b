//! Minipool Types - data model shared by the operator daemon
//!
//! - `validator` - minipool records and lifecycle status
//! - `network` - chain settings, block headers and network snapshots
//! - `exit` - voluntary exits and coordination-service records
//! - `signing` - signature domains, signing roots and validator keys

pub mod exit;
pub mod network;
pub mod signing;
pub mod validator;

pub use exit::{
    Epoch, ExitMessageUpload, RemoteValidator, SignedVoluntaryExit, Slot, UploadOutcome,
    VoluntaryExit,
};
pub use network::{stake_candidates, BlockHeader, NetworkSettings, NetworkSnapshot};
pub use signing::{
    compute_domain, deposit_domain, verify_signature, DepositData, DepositMessage, DomainType,
    ForkVersion, SignedRoot, ValidatorKey, STAKE_AMOUNT_GWEI,
};
pub use validator::{
    BeaconValidatorState, BeaconValidatorStatus, BlsPubkey, BlsSignature, MinipoolStatus,
    ValidatorRecord,
};

// Ethereum primitives used throughout the public API
pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Errors raised while decoding or constructing domain types
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    #[error("Unknown minipool status: {0}")]
    UnknownStatus(u8),

    #[error("Invalid validator key: {0}")]
    InvalidKey(String),
}
