//! Ethereum events as claims orchestrators vote on
//!
//! Each claim type forms its own nonce stream on the Ethereum side. Votes are
//! keyed by the claim hash, so two orchestrators that observed the same event
//! produce the same hash and their votes accumulate on one attestation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{method_word, WordEncoder};
use crate::types::EthAddress;

/// Claim type, one nonce stream per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimKind {
    Deposit,
    BatchExecuted,
    Erc20Deployed,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 3] = [
        ClaimKind::Deposit,
        ClaimKind::BatchExecuted,
        ClaimKind::Erc20Deployed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Deposit => "deposit",
            ClaimKind::BatchExecuted => "batch_executed",
            ClaimKind::Erc20Deployed => "erc20_deployed",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tokens locked in the Ethereum contract for a Hilo recipient
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositClaim {
    pub event_nonce: u64,
    pub eth_block: u64,
    pub token_contract: EthAddress,
    pub eth_sender: EthAddress,
    /// Recipient as emitted on Ethereum; may not be a valid Hilo address
    pub cosmos_recipient: String,
    pub amount: u64,
}

/// A batch was executed by the Ethereum contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchExecutedClaim {
    pub event_nonce: u64,
    pub eth_block: u64,
    pub token_contract: EthAddress,
    pub batch_nonce: u64,
    /// Address that submitted the batch and collected its fees
    pub relayer: EthAddress,
}

/// An ERC20 for a Hilo denom was deployed by the Ethereum contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Erc20DeployedClaim {
    pub event_nonce: u64,
    pub eth_block: u64,
    pub denom: String,
    pub token_contract: EthAddress,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// An Ethereum event an orchestrator attests to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventClaim {
    Deposit(DepositClaim),
    BatchExecuted(BatchExecutedClaim),
    Erc20Deployed(Erc20DeployedClaim),
}

impl EventClaim {
    pub fn kind(&self) -> ClaimKind {
        match self {
            EventClaim::Deposit(_) => ClaimKind::Deposit,
            EventClaim::BatchExecuted(_) => ClaimKind::BatchExecuted,
            EventClaim::Erc20Deployed(_) => ClaimKind::Erc20Deployed,
        }
    }

    pub fn event_nonce(&self) -> u64 {
        match self {
            EventClaim::Deposit(c) => c.event_nonce,
            EventClaim::BatchExecuted(c) => c.event_nonce,
            EventClaim::Erc20Deployed(c) => c.event_nonce,
        }
    }

    pub fn eth_block(&self) -> u64 {
        match self {
            EventClaim::Deposit(c) => c.eth_block,
            EventClaim::BatchExecuted(c) => c.eth_block,
            EventClaim::Erc20Deployed(c) => c.eth_block,
        }
    }

    /// Content hash that identifies the attestation.
    ///
    /// The Ethereum chain id is mixed in so claims from different source
    /// chains never collide.
    pub fn claim_hash(&self, eth_chain_id: u64) -> [u8; 32] {
        let enc = WordEncoder::new()
            .uint(eth_chain_id)
            .bytes32(&method_word(self.kind().as_str()))
            .uint(self.event_nonce())
            .uint(self.eth_block());

        match self {
            EventClaim::Deposit(c) => enc
                .address(&c.token_contract)
                .address(&c.eth_sender)
                .string(&c.cosmos_recipient)
                .uint(c.amount)
                .digest(),
            EventClaim::BatchExecuted(c) => enc
                .address(&c.token_contract)
                .uint(c.batch_nonce)
                .address(&c.relayer)
                .digest(),
            EventClaim::Erc20Deployed(c) => enc
                .string(&c.denom)
                .address(&c.token_contract)
                .string(&c.name)
                .string(&c.symbol)
                .uint(c.decimals as u64)
                .digest(),
        }
    }
}

impl fmt::Display for EventClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.event_nonce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(nonce: u64, amount: u64) -> EventClaim {
        EventClaim::Deposit(DepositClaim {
            event_nonce: nonce,
            eth_block: 10,
            token_contract: EthAddress::repeat_byte(1),
            eth_sender: EthAddress::repeat_byte(2),
            cosmos_recipient: "hilo1recipient".to_string(),
            amount,
        })
    }

    #[test]
    fn test_claim_hash_is_content_addressed() {
        assert_eq!(deposit(1, 100).claim_hash(1), deposit(1, 100).claim_hash(1));
        assert_ne!(deposit(1, 100).claim_hash(1), deposit(1, 101).claim_hash(1));
        assert_ne!(deposit(1, 100).claim_hash(1), deposit(2, 100).claim_hash(1));
    }

    #[test]
    fn test_claim_hash_binds_source_chain() {
        assert_ne!(deposit(1, 100).claim_hash(1), deposit(1, 100).claim_hash(5));
    }

    #[test]
    fn test_kind_and_display() {
        let claim = EventClaim::BatchExecuted(BatchExecutedClaim {
            event_nonce: 3,
            eth_block: 12,
            token_contract: EthAddress::repeat_byte(1),
            batch_nonce: 1,
            relayer: EthAddress::repeat_byte(9),
        });
        assert_eq!(claim.kind(), ClaimKind::BatchExecuted);
        assert_eq!(claim.to_string(), "batch_executed#3");
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(deposit(1, 5)).unwrap();
        assert_eq!(json["type"], "deposit");
        assert_eq!(json["amount"], 5);
    }
}
