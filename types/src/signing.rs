//! Consensus-layer signing: domains, signing roots and BLS keys
//!
//! Messages are signed over `hash_tree_root(SigningData { object_root, domain })`
//! with the proof-of-possession BLS ciphersuite, as the beacon chain expects.

use alloy_primitives::{FixedBytes, B256};
use blst::min_pk::{PublicKey, SecretKey, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;
use tree_hash::{merkle_root, PackedEncoding, TreeHash, TreeHashType};
use tree_hash_derive::TreeHash;

use crate::exit::{SignedVoluntaryExit, VoluntaryExit};
use crate::validator::{BlsPubkey, BlsSignature};
use crate::TypesError;

/// Domain separation tag of the beacon chain's BLS signatures
pub const BLS_DST_SIG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Amount moved to the beacon chain when a prelaunch minipool is staked, in gwei
pub const STAKE_AMOUNT_GWEI: u64 = 31_000_000_000;

/// Beacon fork version
pub type ForkVersion = FixedBytes<4>;

/// Signature domains used by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainType {
    Deposit,
    VoluntaryExit,
}

impl DomainType {
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            DomainType::Deposit => [0x03, 0, 0, 0],
            DomainType::VoluntaryExit => [0x04, 0, 0, 0],
        }
    }
}

/// Containers whose fields are `FixedBytes` get their roots written out by
/// hand, `tree_hash` only knows the plain byte arrays.
macro_rules! impl_container_tree_hash {
    ($type:ty, |$this:ident| [$($field_root:expr),+ $(,)?]) => {
        impl TreeHash for $type {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Container
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("Struct should never be packed.")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("Struct should never be packed.")
            }

            fn tree_hash_root(&self) -> B256 {
                let $this = self;
                container_root(&[$($field_root),+])
            }
        }
    };
}

fn container_root(field_roots: &[B256]) -> B256 {
    let leaves: Vec<u8> = field_roots.iter().flat_map(|root| root.0).collect();
    merkle_root(&leaves, field_roots.len())
}

fn pubkey_root(pubkey: &BlsPubkey) -> B256 {
    pubkey.0.tree_hash_root()
}

/// `Vector[byte, 96]` spans three chunks
fn signature_root(signature: &BlsSignature) -> B256 {
    merkle_root(signature.as_slice(), 3)
}

struct ForkData {
    current_version: ForkVersion,
    genesis_validators_root: B256,
}

impl_container_tree_hash!(ForkData, |fork| [
    fork.current_version.0.tree_hash_root(),
    fork.genesis_validators_root,
]);

#[derive(TreeHash)]
struct SigningData {
    object_root: B256,
    domain: B256,
}

/// Containers that can be signed under a domain
pub trait SignedRoot: TreeHash {
    fn signing_root(&self, domain: B256) -> B256 {
        SigningData {
            object_root: self.tree_hash_root(),
            domain,
        }
        .tree_hash_root()
    }
}

impl SignedRoot for VoluntaryExit {}
impl SignedRoot for DepositMessage {}

/// `compute_domain` from the consensus specs
pub fn compute_domain(
    domain_type: DomainType,
    fork_version: ForkVersion,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = ForkData {
        current_version: fork_version,
        genesis_validators_root,
    }
    .tree_hash_root();

    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(&domain_type.to_bytes());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    B256::from(domain)
}

/// Deposits are signed against the genesis fork with an empty validators root
pub fn deposit_domain(genesis_fork_version: ForkVersion) -> B256 {
    compute_domain(DomainType::Deposit, genesis_fork_version, B256::ZERO)
}

/// Consensus-layer `DepositMessage` container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMessage {
    pub pubkey: BlsPubkey,
    pub withdrawal_credentials: B256,
    pub amount: u64,
}

impl_container_tree_hash!(DepositMessage, |msg| [
    pubkey_root(&msg.pubkey),
    msg.withdrawal_credentials,
    msg.amount.tree_hash_root(),
]);

/// Consensus-layer `DepositData` container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositData {
    pub pubkey: BlsPubkey,
    pub withdrawal_credentials: B256,
    pub amount: u64,
    pub signature: BlsSignature,
}

impl_container_tree_hash!(DepositData, |data| [
    pubkey_root(&data.pubkey),
    data.withdrawal_credentials,
    data.amount.tree_hash_root(),
    signature_root(&data.signature),
]);

impl DepositData {
    pub fn as_deposit_message(&self) -> DepositMessage {
        DepositMessage {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
        }
    }

    /// Root the deposit contract checks the submitted data against
    pub fn deposit_data_root(&self) -> B256 {
        self.tree_hash_root()
    }
}

/// A validator's BLS secret key
pub struct ValidatorKey {
    secret: SecretKey,
}

impl ValidatorKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let secret = SecretKey::from_bytes(bytes)
            .map_err(|e| TypesError::InvalidKey(format!("{:?}", e)))?;
        Ok(Self { secret })
    }

    /// Derive a key from input keying material (at least 32 bytes)
    pub fn from_seed(ikm: &[u8]) -> Result<Self, TypesError> {
        let secret = SecretKey::key_gen(ikm, &[])
            .map_err(|e| TypesError::InvalidKey(format!("{:?}", e)))?;
        Ok(Self { secret })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn pubkey(&self) -> BlsPubkey {
        FixedBytes(self.secret.sk_to_pk().to_bytes())
    }

    pub fn sign_root(&self, root: B256) -> BlsSignature {
        FixedBytes(self.secret.sign(root.as_slice(), BLS_DST_SIG, &[]).to_bytes())
    }

    /// Sign a deposit of `amount_gwei` towards `withdrawal_credentials`
    pub fn sign_deposit(&self, withdrawal_credentials: B256, amount_gwei: u64, domain: B256) -> DepositData {
        let mut data = DepositData {
            pubkey: self.pubkey(),
            withdrawal_credentials,
            amount: amount_gwei,
            signature: BlsSignature::ZERO,
        };
        data.signature = self.sign_root(data.as_deposit_message().signing_root(domain));
        data
    }

    pub fn sign_voluntary_exit(&self, message: VoluntaryExit, domain: B256) -> SignedVoluntaryExit {
        SignedVoluntaryExit {
            signature: self.sign_root(message.signing_root(domain)),
            message,
        }
    }
}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// Check a BLS signature over a signing root
pub fn verify_signature(pubkey: &BlsPubkey, root: B256, signature: &BlsSignature) -> bool {
    let Ok(pubkey) = PublicKey::from_bytes(pubkey.as_slice()) else {
        return false;
    };
    let Ok(signature) = Signature::from_bytes(signature.as_slice()) else {
        return false;
    };
    signature.verify(true, root.as_slice(), BLS_DST_SIG, &[], &pubkey, true) == blst::BLST_ERROR::BLST_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> ValidatorKey {
        ValidatorKey::from_seed(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_domain_layout() {
        let domain = deposit_domain(ForkVersion::ZERO);
        assert_eq!(&domain[..4], &[0x03, 0, 0, 0]);

        let exit_domain = compute_domain(DomainType::VoluntaryExit, ForkVersion::ZERO, B256::ZERO);
        assert_eq!(&exit_domain[..4], &[0x04, 0, 0, 0]);
        assert_eq!(&domain[4..], &exit_domain[4..]);
    }

    #[test]
    fn test_mainnet_deposit_domain() {
        // Mainnet genesis fork version 0x00000000
        let expected = "03000000f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a9";
        assert_eq!(hex::encode(deposit_domain(ForkVersion::ZERO)), expected);
    }

    #[test]
    fn test_deposit_container_roots() {
        let data = DepositData {
            pubkey: FixedBytes([0x11; 48]),
            withdrawal_credentials: B256::repeat_byte(0x22),
            amount: 32_000_000_000,
            signature: FixedBytes([0x33; 96]),
        };

        assert_eq!(
            hex::encode(data.as_deposit_message().tree_hash_root()),
            "a472df246af26daaf8a4a1d9f4b297198e3b9b2bb2820def6e88c5873172d92f"
        );
        assert_eq!(
            hex::encode(data.deposit_data_root()),
            "cb2dbb2331ca1d409208dacd445bb071331eec46bae0db6cd470cdf53c550498"
        );
    }

    #[test]
    fn test_deposit_signature_verifies() {
        let key = key(7);
        let domain = deposit_domain(ForkVersion::ZERO);
        let deposit = key.sign_deposit(B256::repeat_byte(0x01), STAKE_AMOUNT_GWEI, domain);

        assert_eq!(deposit.pubkey, key.pubkey());
        assert_eq!(deposit.amount, STAKE_AMOUNT_GWEI);
        let root = deposit.as_deposit_message().signing_root(domain);
        assert!(verify_signature(&deposit.pubkey, root, &deposit.signature));
        assert_ne!(deposit.deposit_data_root(), B256::ZERO);
    }

    #[test]
    fn test_exit_signature_is_bound_to_domain() {
        let key = key(9);
        let domain = B256::repeat_byte(0x44);
        let exit = VoluntaryExit { epoch: 12, validator_index: 345 };
        let signed = key.sign_voluntary_exit(exit, domain);

        assert_eq!(signed.message, exit);
        assert!(verify_signature(&key.pubkey(), exit.signing_root(domain), &signed.signature));
        assert!(!verify_signature(&key.pubkey(), exit.signing_root(B256::ZERO), &signed.signature));
    }

    #[test]
    fn test_key_bytes_roundtrip() {
        let original = key(3);
        let restored = ValidatorKey::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original.pubkey(), restored.pubkey());
        assert!(ValidatorKey::from_bytes(&[0u8; 5]).is_err());
    }
}
