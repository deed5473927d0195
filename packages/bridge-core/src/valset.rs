//! Validator-set snapshots
//!
//! Voting power is never read from ambient state. Every quorum decision is
//! made against an explicit snapshot.

use serde::{Deserialize, Serialize};

use crate::types::{EthAddress, OrchestratorId};

/// One orchestrator's voting weight and registered Ethereum key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPower {
    pub orchestrator: OrchestratorId,
    pub eth_address: EthAddress,
    pub power: u64,
}

/// Voting power distribution at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetSnapshot {
    pub epoch: u64,
    pub members: Vec<ValidatorPower>,
}

impl ValsetSnapshot {
    pub fn new(epoch: u64, members: Vec<ValidatorPower>) -> Self {
        Self { epoch, members }
    }

    pub fn total_power(&self) -> u64 {
        self.members.iter().map(|m| m.power).sum()
    }

    pub fn member(&self, orchestrator: &OrchestratorId) -> Option<&ValidatorPower> {
        self.members.iter().find(|m| &m.orchestrator == orchestrator)
    }

    pub fn power_of(&self, orchestrator: &OrchestratorId) -> u64 {
        self.member(orchestrator).map(|m| m.power).unwrap_or(0)
    }

    pub fn member_by_eth(&self, eth_address: &EthAddress) -> Option<&ValidatorPower> {
        self.members.iter().find(|m| &m.eth_address == eth_address)
    }

    /// Summed power of the given orchestrators; unknown ids count as zero
    pub fn power_of_set<'a, I>(&self, orchestrators: I) -> u64
    where
        I: IntoIterator<Item = &'a OrchestratorId>,
    {
        orchestrators.into_iter().map(|o| self.power_of(o)).sum()
    }
}

/// `observed >= 2/3 * required`, computed without rounding
pub fn quorum_reached(observed: u64, required: u64) -> bool {
    if required == 0 {
        return false;
    }
    (observed as u128) * 3 >= (required as u128) * 2
}
