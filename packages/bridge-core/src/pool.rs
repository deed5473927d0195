//! Outgoing transaction pool
//!
//! Holds "send to Ethereum" requests until the batch builder picks them up.
//! Selection marks transfers `Batched` in the same call, so a transfer can
//! never sit in two open batches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::batch::{select_for_batch, BatchTransfer, PoolCandidate};
use crate::error::BridgeError;
use crate::registry::FeeSchedule;
use crate::types::{EthAddress, TransferStatus};

/// A user request to move tokens from Hilo to Ethereum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransfer {
    pub id: u64,
    pub sender: String,
    pub eth_recipient: EthAddress,
    pub denom: String,
    pub amount: u64,
    pub bridge_fee: u64,
    pub chain_fee: u64,
    pub status: TransferStatus,
    /// Height at which the transfer last became pending
    pub eligible_since: u64,
}

impl OutgoingTransfer {
    pub fn to_batch_transfer(&self) -> BatchTransfer {
        BatchTransfer {
            id: self.id,
            sender: self.sender.clone(),
            eth_recipient: self.eth_recipient,
            amount: self.amount,
            bridge_fee: self.bridge_fee,
        }
    }

    pub fn to_candidate(&self) -> PoolCandidate {
        PoolCandidate {
            transfer: self.to_batch_transfer(),
            eligible_since: self.eligible_since,
        }
    }
}

/// Parameters of a new outgoing transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub sender: String,
    pub eth_recipient: EthAddress,
    pub denom: String,
    pub amount: u64,
    pub bridge_fee: u64,
    pub chain_fee: u64,
}

impl NewTransfer {
    /// Reject requests below the fee floor or whose amount does not exceed the chain fee
    pub fn validate(&self, fees: &FeeSchedule) -> Result<(), BridgeError> {
        let minimum = fees.minimum_bridge_fee(&self.denom);
        if self.bridge_fee < minimum || self.amount <= self.chain_fee {
            return Err(BridgeError::InvalidFee {
                denom: self.denom.clone(),
                amount: self.amount,
                bridge_fee: self.bridge_fee,
                chain_fee: self.chain_fee,
                minimum,
            });
        }
        Ok(())
    }

    /// Total debited from the sender
    pub fn total_cost(&self) -> Result<u64, BridgeError> {
        self.amount
            .checked_add(self.bridge_fee)
            .and_then(|v| v.checked_add(self.chain_fee))
            .ok_or(BridgeError::Overflow)
    }
}

/// Pool of outgoing transfers keyed by id
#[derive(Debug, Clone, Default)]
pub struct OutgoingPool {
    next_id: u64,
    transfers: BTreeMap<u64, OutgoingTransfer>,
}

impl OutgoingPool {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            transfers: BTreeMap::new(),
        }
    }

    /// Add a validated request; returns its id
    pub fn enqueue(
        &mut self,
        request: NewTransfer,
        fees: &FeeSchedule,
        height: u64,
    ) -> Result<u64, BridgeError> {
        request.validate(fees)?;

        let id = self.next_id.max(1);
        self.next_id = id + 1;

        self.transfers.insert(
            id,
            OutgoingTransfer {
                id,
                sender: request.sender,
                eth_recipient: request.eth_recipient,
                denom: request.denom,
                amount: request.amount,
                bridge_fee: request.bridge_fee,
                chain_fee: request.chain_fee,
                status: TransferStatus::Pending,
                eligible_since: height,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Option<&OutgoingTransfer> {
        self.transfers.get(&id)
    }

    /// Pending transfers for a denom, in id order
    pub fn pending(&self, denom: &str) -> Vec<OutgoingTransfer> {
        self.transfers
            .values()
            .filter(|t| t.status == TransferStatus::Pending && t.denom == denom)
            .cloned()
            .collect()
    }

    /// Denoms with at least one pending transfer, with their counts
    pub fn pending_denoms(&self) -> BTreeMap<String, usize> {
        let mut denoms = BTreeMap::new();
        for t in self.transfers.values() {
            if t.status == TransferStatus::Pending {
                *denoms.entry(t.denom.clone()).or_insert(0) += 1;
            }
        }
        denoms
    }

    /// Candidate batch for a denom without touching the pool
    pub fn peek_for_batch(&self, denom: &str, max_count: usize) -> Vec<BatchTransfer> {
        select_for_batch(
            self.pending(denom).iter().map(OutgoingTransfer::to_batch_transfer),
            max_count,
        )
    }

    /// Select the highest-fee pending transfers for a denom and mark them batched
    pub fn dequeue_for_batch(&mut self, denom: &str, max_count: usize) -> Vec<BatchTransfer> {
        let selected = self.peek_for_batch(denom, max_count);
        for t in &selected {
            if let Some(entry) = self.transfers.get_mut(&t.id) {
                entry.status = TransferStatus::Batched;
            }
        }
        selected
    }

    /// Put the transfers of a batch that will never execute back into the pool
    pub fn return_to_pending(&mut self, ids: &[u64], height: u64) {
        for id in ids {
            if let Some(entry) = self.transfers.get_mut(id) {
                if entry.status == TransferStatus::Batched {
                    entry.status = TransferStatus::Pending;
                    entry.eligible_since = height;
                }
            }
        }
    }

    /// Remove the transfers of an executed batch, returning them as confirmed
    pub fn confirm(&mut self, ids: &[u64]) -> Vec<OutgoingTransfer> {
        ids.iter()
            .filter_map(|id| self.transfers.remove(id))
            .map(|mut t| {
                t.status = TransferStatus::Confirmed;
                t
            })
            .collect()
    }

    /// Remove a pending transfer on behalf of its sender
    pub fn cancel(&mut self, id: u64, sender: &str) -> Result<OutgoingTransfer, BridgeError> {
        let entry = self
            .transfers
            .get(&id)
            .ok_or(BridgeError::UnknownTransfer(id))?;
        if entry.sender != sender {
            return Err(BridgeError::UnknownTransfer(id));
        }
        if entry.status != TransferStatus::Pending {
            return Err(BridgeError::TransferNotPending(id));
        }
        self.transfers
            .remove(&id)
            .ok_or(BridgeError::UnknownTransfer(id))
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
