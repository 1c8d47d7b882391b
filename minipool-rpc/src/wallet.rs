//! Node wallet contract

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Handle used to sign and send transactions from the node account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transactor {
    pub from: Address,
    pub chain_id: u64,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn node_address(&self) -> Address;

    /// Fails with [`crate::RpcError::WalletNotReady`] while the wallet is locked or missing
    async fn transactor(&self) -> Result<Transactor>;
}
