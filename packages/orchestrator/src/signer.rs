//! Orchestrator identity and its Ethereum signing key

use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use eyre::{Result, WrapErr};
use std::fmt;

use hilo_bridge_core::{keccak256, sign_digest, BridgeError, EthAddress, EventClaim, OrchestratorId};

/// An orchestrator's id together with the key it signs votes and batches with
#[derive(Clone)]
pub struct OrchestratorKey {
    pub id: OrchestratorId,
    signer: PrivateKeySigner,
}

/// Custom Debug that never prints key material
impl fmt::Debug for OrchestratorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorKey")
            .field("id", &self.id)
            .field("eth_address", &self.eth_address())
            .field("signer", &"<redacted>")
            .finish()
    }
}

impl OrchestratorKey {
    pub fn new(id: OrchestratorId, signer: PrivateKeySigner) -> Self {
        Self { id, signer }
    }

    /// Parse a 0x-prefixed hex private key
    pub fn from_hex(id: OrchestratorId, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        Ok(Self::new(id, signer))
    }

    /// Deterministic key derived from a seed string (devnets and tests only)
    pub fn from_seed(id: OrchestratorId, seed: &str) -> Result<Self> {
        let secret = B256::from(keccak256(seed.as_bytes()));
        let signer = PrivateKeySigner::from_bytes(&secret).wrap_err("Invalid derived key")?;
        Ok(Self::new(id, signer))
    }

    pub fn eth_address(&self) -> EthAddress {
        self.signer.address()
    }

    /// Sign the hash of an event claim
    pub fn sign_claim(&self, claim: &EventClaim, eth_chain_id: u64) -> Result<Vec<u8>, BridgeError> {
        sign_digest(&self.signer, &claim.claim_hash(eth_chain_id))
    }

    /// Sign a batch checkpoint
    pub fn sign_checkpoint(&self, checkpoint: &[u8; 32]) -> Result<Vec<u8>, BridgeError> {
        sign_digest(&self.signer, checkpoint)
    }

    /// The underlying signer, for sending Ethereum transactions
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilo_bridge_core::verify_signature;

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = OrchestratorKey::from_seed("val0".into(), "seed-0").unwrap();
        let b = OrchestratorKey::from_seed("val0".into(), "seed-0").unwrap();
        let c = OrchestratorKey::from_seed("val1".into(), "seed-1").unwrap();
        assert_eq!(a.eth_address(), b.eth_address());
        assert_ne!(a.eth_address(), c.eth_address());
    }

    #[test]
    fn test_checkpoint_signature_verifies() {
        let key = OrchestratorKey::from_seed("val0".into(), "seed-0").unwrap();
        let checkpoint = keccak256(b"batch");
        let sig = key.sign_checkpoint(&checkpoint).unwrap();
        assert!(verify_signature(&checkpoint, &sig, &key.eth_address()).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = OrchestratorKey::from_seed("val0".into(), "seed-0").unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("val0"));
    }
}
