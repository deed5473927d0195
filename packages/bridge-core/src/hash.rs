//! Hash computation for claims and batch checkpoints
//!
//! Every orchestrator must derive byte-identical digests from identical
//! content, so all encodings here are fixed-width 32-byte words in the
//! same layout `abi.encode` would produce for static types.

use tiny_keccak::{Hasher, Keccak};

use crate::types::EthAddress;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Incremental builder for a sequence of abi-style 32-byte words
#[derive(Debug, Default, Clone)]
pub struct WordEncoder {
    data: Vec<u8>,
}

impl WordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw 32-byte word
    pub fn bytes32(mut self, word: &[u8; 32]) -> Self {
        self.data.extend_from_slice(word);
        self
    }

    /// Append a u64 as a big-endian uint256
    pub fn uint(mut self, value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        self.data.extend_from_slice(&word);
        self
    }

    /// Append an address left-padded to 32 bytes
    pub fn address(mut self, address: &EthAddress) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_slice());
        self.data.extend_from_slice(&word);
        self
    }

    /// Append a dynamic string as the hash of its bytes
    pub fn string(self, s: &str) -> Self {
        let digest = keccak256(s.as_bytes());
        self.bytes32(&digest)
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }

    pub fn digest(self) -> [u8; 32] {
        keccak256(&self.data)
    }
}

/// Domain separator for a bridge deployment
///
/// The gravity id keeps signatures from one deployment from being replayed
/// against another.
pub fn gravity_id_word(gravity_id: &str) -> [u8; 32] {
    let mut word = [0u8; 32];
    let bytes = gravity_id.as_bytes();
    if bytes.len() <= 32 {
        word[..bytes.len()].copy_from_slice(bytes);
        word
    } else {
        keccak256(bytes)
    }
}

/// Method word for the named checkpoint type, e.g. `transactionBatch`
pub fn method_word(name: &str) -> [u8; 32] {
    gravity_id_word(name)
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_word_encoder_layout() {
        let addr = EthAddress::repeat_byte(0xab);
        let encoded = WordEncoder::new().uint(42).address(&addr).finish();

        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 42);
        assert!(encoded[..31].iter().all(|b| *b == 0));
        assert!(encoded[32..44].iter().all(|b| *b == 0));
        assert!(encoded[44..64].iter().all(|b| *b == 0xab));
    }

    #[test]
    fn test_gravity_id_word_padding() {
        let word = gravity_id_word("hilo-gravity");
        assert_eq!(&word[..12], b"hilo-gravity");
        assert!(word[12..].iter().all(|b| *b == 0));

        let long = "x".repeat(40);
        assert_eq!(gravity_id_word(&long), keccak256(long.as_bytes()));
    }
}
