//! Common types for the Hilo bridge
//!
//! Shared between the on-chain bridge module and the orchestrators.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy::primitives::{Address as EthAddress, B256};

/// Bech32 prefix used by Hilo accounts
pub const HILO_BECH32_PREFIX: &str = "hilo";

/// Account holding escrowed Cosmos-originated tokens while they live on Ethereum
pub const BRIDGE_MODULE_ACCOUNT: &str = "gravity";

/// Account receiving chain fees paid on outgoing transfers
pub const FEE_COLLECTOR_ACCOUNT: &str = "fee_collector";

/// Account receiving deposits whose Cosmos recipient could not be parsed
pub const COMMUNITY_POOL_ACCOUNT: &str = "community_pool";

// ============================================================================
// Orchestrator identity
// ============================================================================

/// Identifier of an orchestrator (the validator operator address it acts for)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrchestratorId(pub String);

impl OrchestratorId {
    pub fn new(id: impl Into<String>) -> Self {
        OrchestratorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrchestratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrchestratorId {
    fn from(id: &str) -> Self {
        OrchestratorId(id.to_string())
    }
}

// ============================================================================
// Coins
// ============================================================================

/// An amount of a single Cosmos denomination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

impl Coin {
    pub fn new(amount: u64, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// Parse the Cosmos SDK coin notation, e.g. `300uhilo` or `7ibc/27394F...`
    pub fn parse(s: &str) -> Option<Self> {
        let split = s.find(|c: char| !c.is_ascii_digit())?;
        if split == 0 {
            return None;
        }
        let amount = s[..split].parse().ok()?;
        Some(Coin::new(amount, &s[split..]))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Lifecycle of an outgoing transfer in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Batched,
    Confirmed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Batched => "batched",
            TransferStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of an outgoing batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Built, collecting orchestrator signatures
    Pending,
    /// Signature quorum reached, ready to relay
    Signed,
    /// A relayer reported submitting it to Ethereum
    Submitted,
    /// Execution observed on Ethereum through attestation
    Executed,
    /// Never executed; its transfers went back to the pool
    TimedOut,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Signed => "signed",
            BatchStatus::Submitted => "submitted",
            BatchStatus::Executed => "executed",
            BatchStatus::TimedOut => "timed_out",
        }
    }

    /// Whether the batch can still be executed on Ethereum
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            BatchStatus::Pending | BatchStatus::Signed | BatchStatus::Submitted
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
