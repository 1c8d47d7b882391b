//! Validator key store contract and an in-memory implementation

use async_trait::async_trait;
use minipool_types::{BlsPubkey, ValidatorKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the signing key for `pubkey`, `None` if this node does not hold it
    async fn load_validator_key(&self, pubkey: &BlsPubkey) -> Result<Option<ValidatorKey>>;
}

/// Key store holding raw secret keys in process memory
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<BlsPubkey, [u8; 32]>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key, returning its public key
    pub fn insert(&self, key: &ValidatorKey) -> BlsPubkey {
        let pubkey = key.pubkey();
        self.keys.write().insert(pubkey, key.to_bytes());
        debug!(pubkey = %pubkey, "Stored validator key");
        pubkey
    }

    pub fn remove(&self, pubkey: &BlsPubkey) -> bool {
        self.keys.write().remove(pubkey).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn load_validator_key(&self, pubkey: &BlsPubkey) -> Result<Option<ValidatorKey>> {
        let bytes = self.keys.read().get(pubkey).copied();
        match bytes {
            Some(bytes) => Ok(Some(ValidatorKey::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = InMemoryKeyStore::new();
        let key = ValidatorKey::from_seed(&[5u8; 32]).unwrap();
        let pubkey = store.insert(&key);

        let loaded = store.load_validator_key(&pubkey).await.unwrap().unwrap();
        assert_eq!(loaded.pubkey(), pubkey);
        assert_eq!(store.len(), 1);

        assert!(store.remove(&pubkey));
        assert!(store.load_validator_key(&pubkey).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
