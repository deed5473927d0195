//! Orchestrator signatures over claim hashes and batch checkpoints
//!
//! Signatures are recoverable secp256k1 over the Ethereum signed-message
//! digest of the 32-byte payload, so the Ethereum contract can verify batch
//! confirmations with `ecrecover`.

use alloy::primitives::{PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::error::BridgeError;
use crate::hash::keccak256;
use crate::types::EthAddress;

/// Length of a serialized (r, s, v) signature
pub const SIGNATURE_LEN: usize = 65;

/// keccak256("\x19Ethereum Signed Message:\n32" ++ digest)
pub fn eth_signed_message_hash(digest: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(28 + 32);
    data.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    data.extend_from_slice(digest);
    keccak256(&data)
}

/// Sign a 32-byte payload, returning the 65-byte signature
pub fn sign_digest(signer: &PrivateKeySigner, digest: &[u8; 32]) -> Result<Vec<u8>, BridgeError> {
    let prehash = B256::from(eth_signed_message_hash(digest));
    let signature = signer
        .sign_hash_sync(&prehash)
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;
    Ok(signature.as_bytes().to_vec())
}

/// Recover the Ethereum address that signed `digest`
pub fn recover_signer(digest: &[u8; 32], signature: &[u8]) -> Result<EthAddress, BridgeError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(BridgeError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }

    let signature = PrimitiveSignature::try_from(signature)
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;
    let prehash = B256::from(eth_signed_message_hash(digest));

    signature
        .recover_address_from_prehash(&prehash)
        .map_err(|e| BridgeError::InvalidSignature(e.to_string()))
}

/// Check that `signature` over `digest` was produced by `expected`
pub fn verify_signature(
    digest: &[u8; 32],
    signature: &[u8],
    expected: &EthAddress,
) -> Result<(), BridgeError> {
    let recovered = recover_signer(digest, signature)?;
    if &recovered != expected {
        return Err(BridgeError::InvalidSignature(format!(
            "signed by {recovered}, expected {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known anvil account #0
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn signer() -> PrivateKeySigner {
        TEST_KEY.parse().unwrap()
    }

    #[test]
    fn test_sign_and_recover() {
        let digest = keccak256(b"checkpoint");
        let signature = sign_digest(&signer(), &digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_LEN);

        let recovered = recover_signer(&digest, &signature).unwrap();
        assert_eq!(recovered, TEST_ADDRESS.parse::<EthAddress>().unwrap());
        assert!(verify_signature(&digest, &signature, &recovered).is_ok());
    }

    #[test]
    fn test_signature_over_other_digest_fails() {
        let signature = sign_digest(&signer(), &keccak256(b"one")).unwrap();
        let expected: EthAddress = TEST_ADDRESS.parse().unwrap();
        assert!(verify_signature(&keccak256(b"two"), &signature, &expected).is_err());
    }

    #[test]
    fn test_rejects_truncated_signature() {
        let err = recover_signer(&[0u8; 32], &[1u8; 64]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidSignature(_)));
    }
}
