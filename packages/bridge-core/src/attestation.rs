//! Threshold attestation of Ethereum events
//!
//! Per claim hash an attestation moves `Unseen -> Pending -> Observed`. The
//! transition to Observed happens exactly once, when the power of the
//! orchestrators that voted reaches two thirds of the snapshot's total power.
//! Observed attestations are never touched again.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::claims::{ClaimKind, EventClaim};
use crate::error::BridgeError;
use crate::hash::bytes32_to_hex;
use crate::types::OrchestratorId;
use crate::valset::{quorum_reached, ValsetSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationStatus {
    Pending,
    Observed,
}

/// Votes accumulated for one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub claim: EventClaim,
    pub votes: BTreeMap<OrchestratorId, u64>,
    pub required_power: u64,
    pub observed_power: u64,
    pub status: AttestationStatus,
    /// Hilo height of the first vote
    pub first_seen: u64,
    /// Hilo height the quorum was reached at
    pub observed_at: Option<u64>,
}

/// Result of an accepted vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote recorded; quorum not reached yet
    Recorded {
        observed_power: u64,
        required_power: u64,
    },
    /// This vote crossed the threshold; the claim must be applied now
    Observed(EventClaim),
}

#[derive(Debug, Clone)]
pub struct AttestationEngine {
    eth_chain_id: u64,
    attestations: HashMap<[u8; 32], Attestation>,
    last_observed: BTreeMap<ClaimKind, u64>,
    /// Claim hash each orchestrator voted for, per stream position not yet
    /// observed
    voter_claims: HashMap<(OrchestratorId, ClaimKind, u64), [u8; 32]>,
}

impl AttestationEngine {
    pub fn new(eth_chain_id: u64) -> Self {
        Self {
            eth_chain_id,
            attestations: HashMap::new(),
            last_observed: BTreeMap::new(),
            voter_claims: HashMap::new(),
        }
    }

    /// Nonce of the last Observed claim in a stream (0 if none)
    pub fn last_observed_nonce(&self, kind: ClaimKind) -> u64 {
        self.last_observed.get(&kind).copied().unwrap_or(0)
    }

    pub fn claim_hash(&self, claim: &EventClaim) -> [u8; 32] {
        claim.claim_hash(self.eth_chain_id)
    }

    pub fn attestation(&self, claim_hash: &[u8; 32]) -> Option<&Attestation> {
        self.attestations.get(claim_hash)
    }

    /// Attestations still collecting votes
    pub fn pending(&self) -> impl Iterator<Item = &Attestation> {
        self.attestations
            .values()
            .filter(|a| a.status == AttestationStatus::Pending)
    }

    /// Record one orchestrator's vote for `claim`.
    ///
    /// Rejections leave the engine unchanged.
    pub fn vote(
        &mut self,
        valset: &ValsetSnapshot,
        orchestrator: &OrchestratorId,
        claim: EventClaim,
        height: u64,
    ) -> Result<VoteOutcome, BridgeError> {
        if valset.member(orchestrator).is_none() {
            return Err(BridgeError::UnknownOrchestrator(orchestrator.to_string()));
        }

        let hash = self.claim_hash(&claim);
        if let Some(existing) = self.attestations.get(&hash) {
            if existing.votes.contains_key(orchestrator) {
                return Err(BridgeError::DuplicateVote {
                    orchestrator: orchestrator.clone(),
                    claim_hash: bytes32_to_hex(&hash),
                });
            }
        }

        let kind = claim.kind();
        let nonce = claim.event_nonce();
        let expected = self.last_observed_nonce(kind) + 1;
        if nonce != expected {
            return Err(BridgeError::StaleNonce {
                kind,
                expected,
                got: nonce,
            });
        }

        let slot = (orchestrator.clone(), kind, nonce);
        if let Some(previous) = self.voter_claims.get(&slot) {
            if previous != &hash {
                return Err(BridgeError::ConflictingClaim {
                    orchestrator: orchestrator.clone(),
                    kind,
                    nonce,
                });
            }
        }
        self.voter_claims.insert(slot, hash);

        let attestation = self.attestations.entry(hash).or_insert_with(|| Attestation {
            claim,
            votes: BTreeMap::new(),
            required_power: 0,
            observed_power: 0,
            status: AttestationStatus::Pending,
            first_seen: height,
            observed_at: None,
        });

        attestation
            .votes
            .insert(orchestrator.clone(), valset.power_of(orchestrator));
        attestation.observed_power = valset.power_of_set(attestation.votes.keys());
        attestation.required_power = valset.total_power();

        debug!(
            claim = %attestation.claim,
            orchestrator = %orchestrator,
            observed_power = attestation.observed_power,
            required_power = attestation.required_power,
            "Vote recorded"
        );

        if attestation.status == AttestationStatus::Pending
            && quorum_reached(attestation.observed_power, attestation.required_power)
        {
            attestation.status = AttestationStatus::Observed;
            attestation.observed_at = Some(height);
            self.last_observed.insert(kind, nonce);
            // Later votes at this position fail the nonce check
            self.voter_claims.retain(|(_, k, n), _| *k != kind || *n > nonce);

            info!(
                claim = %attestation.claim,
                claim_hash = %bytes32_to_hex(&hash),
                votes = attestation.votes.len(),
                "Attestation observed"
            );
            return Ok(VoteOutcome::Observed(attestation.claim.clone()));
        }

        Ok(VoteOutcome::Recorded {
            observed_power: attestation.observed_power,
            required_power: attestation.required_power,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::DepositClaim;
    use crate::types::EthAddress;
    use crate::valset::ValidatorPower;

    fn valset(powers: &[u64]) -> ValsetSnapshot {
        ValsetSnapshot::new(
            1,
            powers
                .iter()
                .enumerate()
                .map(|(i, power)| ValidatorPower {
                    orchestrator: OrchestratorId::new(format!("val{}", i + 1)),
                    eth_address: EthAddress::repeat_byte(i as u8 + 1),
                    power: *power,
                })
                .collect(),
        )
    }

    fn deposit(nonce: u64, amount: u64) -> EventClaim {
        EventClaim::Deposit(DepositClaim {
            event_nonce: nonce,
            eth_block: 100 + nonce,
            token_contract: EthAddress::repeat_byte(0xaa),
            eth_sender: EthAddress::repeat_byte(0xbb),
            cosmos_recipient: "hilo1recipient".to_string(),
            amount,
        })
    }

    fn id(n: u8) -> OrchestratorId {
        OrchestratorId::new(format!("val{n}"))
    }

    #[test]
    fn test_observed_exactly_once_at_two_thirds() {
        let valset = valset(&[100, 100, 100]);
        let mut engine = AttestationEngine::new(1);

        let first = engine.vote(&valset, &id(1), deposit(1, 50), 1).unwrap();
        assert_eq!(
            first,
            VoteOutcome::Recorded {
                observed_power: 100,
                required_power: 300
            }
        );

        let second = engine.vote(&valset, &id(2), deposit(1, 50), 1).unwrap();
        assert_eq!(second, VoteOutcome::Observed(deposit(1, 50)));
        assert_eq!(engine.last_observed_nonce(ClaimKind::Deposit), 1);

        // the third vote arrives after observation and is late
        let third = engine.vote(&valset, &id(3), deposit(1, 50), 2).unwrap_err();
        assert!(third.is_benign());
    }

    #[test]
    fn test_observed_position_stops_tracking_voters() {
        let valset = valset(&[100, 100, 100]);
        let mut engine = AttestationEngine::new(1);

        for nonce in 1..=3 {
            // val3 votes for a competing claim that never gets quorum
            engine.vote(&valset, &id(3), deposit(nonce, 1), 1).unwrap();
            engine.vote(&valset, &id(1), deposit(nonce, 5), 1).unwrap();
            engine.vote(&valset, &id(2), deposit(nonce, 5), 1).unwrap();
            assert!(engine.voter_claims.is_empty());
        }

        engine.vote(&valset, &id(1), deposit(4, 5), 1).unwrap();
        assert_eq!(engine.voter_claims.len(), 1);
        let err = engine.vote(&valset, &id(1), deposit(4, 6), 1).unwrap_err();
        assert!(matches!(err, BridgeError::ConflictingClaim { nonce: 4, .. }));
    }

    #[test]
    fn test_below_threshold_never_observed() {
        let valset = valset(&[34, 33, 33]);
        let mut engine = AttestationEngine::new(1);

        engine.vote(&valset, &id(2), deposit(1, 5), 1).unwrap();
        let outcome = engine.vote(&valset, &id(3), deposit(1, 5), 1).unwrap();
        assert!(matches!(outcome, VoteOutcome::Recorded { observed_power: 66, .. }));
        assert_eq!(engine.last_observed_nonce(ClaimKind::Deposit), 0);
    }

    #[test]
    fn test_duplicate_vote_rejected() {
        let valset = valset(&[100, 100, 100]);
        let mut engine = AttestationEngine::new(1);

        engine.vote(&valset, &id(1), deposit(1, 5), 1).unwrap();
        let err = engine.vote(&valset, &id(1), deposit(1, 5), 1).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateVote { .. }));

        let hash = engine.claim_hash(&deposit(1, 5));
        assert_eq!(engine.attestation(&hash).unwrap().votes.len(), 1);
    }

    #[test]
    fn test_skipped_nonce_rejected() {
        let valset = valset(&[100, 100, 100]);
        let mut engine = AttestationEngine::new(1);

        let err = engine.vote(&valset, &id(1), deposit(2, 5), 1).unwrap_err();
        assert_eq!(
            err,
            BridgeError::StaleNonce {
                kind: ClaimKind::Deposit,
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn test_conflicting_claim_rejected() {
        let valset = valset(&[100, 100, 100]);
        let mut engine = AttestationEngine::new(1);

        engine.vote(&valset, &id(1), deposit(1, 5), 1).unwrap();
        let err = engine.vote(&valset, &id(1), deposit(1, 6), 1).unwrap_err();
        assert!(matches!(err, BridgeError::ConflictingClaim { nonce: 1, .. }));
    }

    #[test]
    fn test_unknown_orchestrator_rejected() {
        let valset = valset(&[100]);
        let mut engine = AttestationEngine::new(1);
        let err = engine
            .vote(&valset, &OrchestratorId::new("mallory"), deposit(1, 5), 1)
            .unwrap_err();
        assert_eq!(err, BridgeError::UnknownOrchestrator("mallory".to_string()));
    }

    #[test]
    fn test_streams_are_independent() {
        use crate::claims::BatchExecutedClaim;

        let valset = valset(&[100]);
        let mut engine = AttestationEngine::new(1);
        engine.vote(&valset, &id(1), deposit(1, 5), 1).unwrap();

        let batch = EventClaim::BatchExecuted(BatchExecutedClaim {
            event_nonce: 1,
            eth_block: 110,
            token_contract: EthAddress::repeat_byte(0xaa),
            batch_nonce: 1,
            relayer: EthAddress::repeat_byte(0xcc),
        });
        assert!(matches!(
            engine.vote(&valset, &id(1), batch, 1).unwrap(),
            VoteOutcome::Observed(_)
        ));
    }
}
