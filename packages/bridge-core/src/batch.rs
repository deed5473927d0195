//! Outgoing batches and deterministic batch construction
//!
//! Every orchestrator rebuilds each batch from its own view of the pool and
//! signs the resulting checkpoint. Selection and encoding therefore must be
//! pure functions of the pool snapshot: highest bridge fee first, ties broken
//! by ascending transfer id.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::error::BridgeError;
use crate::hash::{gravity_id_word, method_word, WordEncoder};
use crate::types::{BatchStatus, EthAddress};

/// The immutable part of an outgoing transfer that a batch carries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchTransfer {
    pub id: u64,
    pub sender: String,
    pub eth_recipient: EthAddress,
    pub amount: u64,
    pub bridge_fee: u64,
}

/// A bundle of outgoing transfers executed on Ethereum under one nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub token_contract: EthAddress,
    pub denom: String,
    pub nonce: u64,
    pub transfers: Vec<BatchTransfer>,
    pub total_fee: u64,
    pub status: BatchStatus,
    /// Hilo height the batch was built at
    pub created_at: u64,
    /// Digest orchestrators sign and Ethereum verifies
    pub checkpoint: [u8; 32],
    /// Ethereum tx hash reported by the relayer, if any
    pub submitted_tx: Option<String>,
}

impl Batch {
    /// Build a batch from already-selected transfers
    pub fn build(
        gravity_id: &str,
        token_contract: EthAddress,
        denom: &str,
        nonce: u64,
        transfers: Vec<BatchTransfer>,
        created_at: u64,
    ) -> Result<Self, BridgeError> {
        let total_fee = total_fee(&transfers)?;
        let checkpoint = batch_checkpoint(gravity_id, &token_contract, nonce, &transfers);
        Ok(Self {
            token_contract,
            denom: denom.to_string(),
            nonce,
            transfers,
            total_fee,
            status: BatchStatus::Pending,
            created_at,
            checkpoint,
            submitted_tx: None,
        })
    }

    pub fn transfer_ids(&self) -> Vec<u64> {
        self.transfers.iter().map(|t| t.id).collect()
    }

    pub fn key(&self) -> (EthAddress, u64) {
        (self.token_contract, self.nonce)
    }
}

/// A batch together with the orchestrator signatures over its checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBatch {
    pub batch: Batch,
    /// (signer Ethereum address, 65-byte signature)
    pub signatures: Vec<(EthAddress, Vec<u8>)>,
}

/// Summed bridge fees of a set of transfers
pub fn total_fee(transfers: &[BatchTransfer]) -> Result<u64, BridgeError> {
    transfers
        .iter()
        .try_fold(0u64, |sum, t| sum.checked_add(t.bridge_fee))
        .ok_or(BridgeError::Overflow)
}

/// Checkpoint digest of a transaction batch.
///
/// Layout: gravity id, method word, token, nonce, transfer count, then
/// (id, recipient, amount, fee) per transfer in batch order.
pub fn batch_checkpoint(
    gravity_id: &str,
    token_contract: &EthAddress,
    nonce: u64,
    transfers: &[BatchTransfer],
) -> [u8; 32] {
    let mut enc = WordEncoder::new()
        .bytes32(&gravity_id_word(gravity_id))
        .bytes32(&method_word("transactionBatch"))
        .address(token_contract)
        .uint(nonce)
        .uint(transfers.len() as u64);

    for transfer in transfers {
        enc = enc
            .uint(transfer.id)
            .address(&transfer.eth_recipient)
            .uint(transfer.amount)
            .uint(transfer.bridge_fee);
    }

    enc.digest()
}

/// Select up to `max_count` transfers by fee priority.
///
/// Highest bridge fee first; equal fees keep insertion order (ascending id).
pub fn select_for_batch<I>(candidates: I, max_count: usize) -> Vec<BatchTransfer>
where
    I: IntoIterator<Item = BatchTransfer>,
{
    let mut candidates: Vec<BatchTransfer> = candidates.into_iter().collect();
    candidates.sort_by_key(|t| (Reverse(t.bridge_fee), t.id));
    candidates.truncate(max_count);
    candidates
}

/// Pool candidate as seen by an orchestrator, with the height it became eligible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCandidate {
    pub transfer: BatchTransfer,
    pub eligible_since: u64,
}

/// Reconstruct the pool snapshot a batch was built from.
///
/// The snapshot is the batch's own transfers plus every transfer that is
/// still pending and was already eligible when the batch was built.
pub fn rebuild_snapshot(batch: &Batch, pending: &[PoolCandidate]) -> Vec<BatchTransfer> {
    let mut snapshot: BTreeMap<u64, BatchTransfer> = batch
        .transfers
        .iter()
        .map(|t| (t.id, t.clone()))
        .collect();

    for candidate in pending {
        if candidate.eligible_since <= batch.created_at {
            snapshot
                .entry(candidate.transfer.id)
                .or_insert_with(|| candidate.transfer.clone());
        }
    }

    snapshot.into_values().collect()
}

/// Independently recompute a batch and compare it with the one on chain.
///
/// Returns `BatchDivergence` if the local view selects different transfers,
/// orders them differently or derives a different checkpoint.
pub fn verify_batch(
    gravity_id: &str,
    batch: &Batch,
    pending: &[PoolCandidate],
    max_count: usize,
) -> Result<(), BridgeError> {
    let snapshot = rebuild_snapshot(batch, pending);
    let selected = select_for_batch(snapshot, max_count);
    let expected = Batch::build(
        gravity_id,
        batch.token_contract,
        &batch.denom,
        batch.nonce,
        selected,
        batch.created_at,
    )?;

    if expected.transfers != batch.transfers
        || expected.checkpoint != batch.checkpoint
        || expected.total_fee != batch.total_fee
    {
        return Err(BridgeError::BatchDivergence {
            token: batch.token_contract,
            nonce: batch.nonce,
        });
    }

    Ok(())
}

/// When and how batches are built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchBuilderConfig {
    /// Maximum transfers per batch
    pub max_size: usize,
    /// Build on every height divisible by this interval
    pub interval_blocks: u64,
    /// Heights a batch may wait for signature quorum before timing out
    pub timeout_blocks: u64,
}

impl Default for BatchBuilderConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            interval_blocks: 10,
            timeout_blocks: 100,
        }
    }
}

impl BatchBuilderConfig {
    /// Whether a batch for a denom with `pending` transfers is due at `height`
    pub fn is_due(&self, height: u64, pending: usize) -> bool {
        if pending == 0 {
            return false;
        }
        pending >= self.max_size || height % self.interval_blocks.max(1) == 0
    }

    /// Whether a batch built at `created_at` has run out of time at `height`
    pub fn is_expired(&self, created_at: u64, height: u64) -> bool {
        height.saturating_sub(created_at) >= self.timeout_blocks
    }
}
