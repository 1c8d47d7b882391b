//! Voluntary exits and the coordination service's exit-escrow records

use serde::{Deserialize, Serialize};
use tree_hash_derive::TreeHash;

use crate::validator::{BlsPubkey, BlsSignature};

/// Consensus epoch number
pub type Epoch = u64;

/// Consensus slot number
pub type Slot = u64;

/// Consensus-layer `VoluntaryExit` container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TreeHash)]
pub struct VoluntaryExit {
    pub epoch: Epoch,
    pub validator_index: u64,
}

/// A voluntary exit together with the validator's signature over it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: BlsSignature,
}

/// One entry of an exit upload to the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitMessageUpload {
    pub pubkey: BlsPubkey,
    pub exit_message: SignedVoluntaryExit,
}

/// The coordination service's record of one of the node's validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteValidator {
    pub pubkey: BlsPubkey,
    pub exit_message_uploaded: bool,
}

/// Service-level outcome of an exit upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// The node is not registered with the service
    pub not_registered: bool,
    /// The node is registered but not allowed to upload exits
    pub not_authorized: bool,
}

impl UploadOutcome {
    pub fn is_accepted(&self) -> bool {
        !self.not_registered && !self.not_authorized
    }
}
