//! Applying ledger operations to the snapshot.

use ballot_ledger::{Chain, Snapshot};
use ballot_types::NodeId;
use tracing::warn;

use crate::ops::LedgerOp;

/// A snapshot change worth telling the outside world about.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotChange {
    ValidatorAdded(NodeId),
    LeadValidatorSet(NodeId),
    CandidateAdded { candidate_id: u64, candidate_name: String },
    ElectorAdded(String),
    VoteCounted { candidate_id: u64, tally: u64, voter_public_key: String },
}

/// Apply one operation. `SUBMIT_BLOCK` only authenticates its block and
/// changes nothing.
pub fn apply_op(snapshot: &mut Snapshot, op: &LedgerOp) -> Option<SnapshotChange> {
    match op {
        LedgerOp::AddValidator(add) => snapshot
            .add_validator(add.node_id.clone())
            .then(|| SnapshotChange::ValidatorAdded(add.node_id.clone())),
        LedgerOp::SetLeadValidator(set) => {
            snapshot.set_lead_validator(Some(set.node_id.clone()));
            Some(SnapshotChange::LeadValidatorSet(set.node_id.clone()))
        }
        LedgerOp::AddCandidate(add) => {
            snapshot.add_candidate(add.candidate_id, add.candidate_name.clone());
            Some(SnapshotChange::CandidateAdded {
                candidate_id: add.candidate_id,
                candidate_name: add.candidate_name.clone(),
            })
        }
        LedgerOp::AddElector(add) => {
            snapshot.add_elector(&add.elector_public_key);
            Some(SnapshotChange::ElectorAdded(add.elector_public_key.clone()))
        }
        LedgerOp::AddVote(vote) => {
            snapshot.record_vote(vote.vote_choice, &vote.voter_public_key);
            Some(SnapshotChange::VoteCounted {
                candidate_id: vote.vote_choice,
                tally: snapshot.votes_for(vote.vote_choice),
                voter_public_key: vote.voter_public_key.clone(),
            })
        }
        LedgerOp::SubmitBlock(_) => None,
    }
}

/// Rebuild a snapshot from genesis by replaying every block of `chain`.
///
/// Malformed transactions are skipped, exactly as incremental finalization
/// skips them, so both paths yield the same snapshot.
pub fn replay_chain(chain: &Chain) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for block in chain.blocks() {
        for tx in block.transactions() {
            match LedgerOp::parse(tx) {
                Ok(Some(op)) => {
                    apply_op(&mut snapshot, &op);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping transaction during replay"),
            }
        }
    }
    snapshot.set_blockchain_head(chain.head().clone());
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{AddCandidate, AddElector};
    use ballot_crypto::NodeKeypair;

    #[test]
    fn duplicate_validator_reports_nothing() {
        let kp = NodeKeypair::generate();
        let mut snapshot = Snapshot::new();
        let op = LedgerOp::add_validator(NodeId::from("a"), &kp);
        assert!(apply_op(&mut snapshot, &op).is_some());
        assert!(apply_op(&mut snapshot, &op).is_none());
        assert_eq!(snapshot.validator_count(), 1);
    }

    #[test]
    fn vote_reports_running_tally() {
        let mut snapshot = Snapshot::new();
        apply_op(
            &mut snapshot,
            &LedgerOp::AddCandidate(AddCandidate {
                candidate_name: "A".into(),
                candidate_id: 1,
            }),
        );
        apply_op(
            &mut snapshot,
            &LedgerOp::AddElector(AddElector {
                elector_public_key: "02aa".into(),
            }),
        );
        let change = apply_op(
            &mut snapshot,
            &LedgerOp::AddVote(crate::ops::AddVote {
                vote_choice: 1,
                voter_public_key: "02aa".into(),
                vote_signature: String::new(),
                nonce: "n".into(),
            }),
        );
        assert!(matches!(change, Some(SnapshotChange::VoteCounted { tally: 1, .. })));
        assert!(snapshot.has_elector_voted("02aa"));
    }

    #[test]
    fn submit_block_changes_nothing() {
        let kp = NodeKeypair::generate();
        let mut snapshot = Snapshot::new();
        let before = snapshot.clone();
        assert!(apply_op(&mut snapshot, &LedgerOp::submit_block(NodeId::from("a"), &kp)).is_none());
        assert_eq!(snapshot, before);
    }

    mod equivalence {
        use super::*;
        use crate::state::LedgerState;
        use proptest::prelude::*;
        use std::time::Duration;

        fn op_strategy() -> impl Strategy<Value = LedgerOp> {
            prop_oneof![
                "[a-e]".prop_map(|id| LedgerOp::set_lead_validator(NodeId::new(id))),
                (1u64..4, "[A-C]").prop_map(|(candidate_id, candidate_name)| {
                    LedgerOp::AddCandidate(AddCandidate {
                        candidate_name,
                        candidate_id,
                    })
                }),
                "0[23][a-f]{4}".prop_map(|elector_public_key| LedgerOp::AddElector(AddElector {
                    elector_public_key
                })),
                (1u64..4, "0[23][a-f]{4}").prop_map(|(vote_choice, voter_public_key)| {
                    LedgerOp::AddVote(crate::ops::AddVote {
                        vote_choice,
                        voter_public_key,
                        vote_signature: String::new(),
                        nonce: "n".into(),
                    })
                }),
            ]
        }

        proptest! {
            #[test]
            fn replay_matches_incremental_updates(
                blocks in prop::collection::vec(prop::collection::vec(op_strategy(), 0..5), 1..6)
            ) {
                let kp = NodeKeypair::generate();
                let mut state = LedgerState::new(NodeId::from("local"), Duration::from_secs(10));
                for ops in blocks {
                    state.add_op(&LedgerOp::add_validator(NodeId::from("v"), &kp)).unwrap();
                    for op in &ops {
                        state.add_op(op).unwrap();
                    }
                    state.finalize_block().unwrap();
                }
                prop_assert_eq!(&replay_chain(state.chain()), state.snapshot());
            }
        }
    }
}
