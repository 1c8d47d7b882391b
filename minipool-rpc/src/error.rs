//! RPC error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Client not synced: {0}")]
    NotSynced(String),

    #[error("Wallet not ready: {0}")]
    WalletNotReady(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Types error: {0}")]
    Types(#[from] minipool_types::TypesError),
}

pub type Result<T> = std::result::Result<T, RpcError>;
