//! Validator-side verification of a block announced by a peer.

use ballot_crypto::verify_signature;
use ballot_ledger::{Block, Snapshot};
use ballot_messages::VoteMessage;
use ballot_types::NodeId;
use thiserror::Error;

use crate::ops::LedgerOp;
use crate::replay::apply_op;
use crate::vote::{verify_vote, VoteRejection};

#[derive(Debug, Error, PartialEq)]
pub enum BlockRejection {
    #[error("block has no transactions")]
    Empty,

    #[error("last transaction neither names a lead nor proves authorship")]
    Unauthenticated,

    #[error("no lead validator is known")]
    NoLeadValidator,

    #[error("public key of lead validator {0} is unknown")]
    UnknownLeadKey(NodeId),

    #[error("proposer signature does not verify against the lead validator")]
    BadProposerSignature,

    #[error("malformed transaction: {0}")]
    Malformed(String),

    #[error("invalid vote: {0}")]
    Vote(#[from] VoteRejection),
}

/// Check a block before a validator adopts it.
///
/// The block must end in `SET_LEAD_VALIDATOR` or in a `SUBMIT_BLOCK` signed
/// by the lead recorded in `snapshot`. Votes are verified in block order
/// against a scratch copy of the snapshot, so a block cannot count the same
/// elector twice.
pub fn verify_proposed_block<F>(snapshot: &Snapshot, public_key_of: F, block: &Block) -> Result<(), BlockRejection>
where
    F: Fn(&NodeId) -> Option<String>,
{
    let last = block.last_transaction().ok_or(BlockRejection::Empty)?;
    match LedgerOp::parse(last).map_err(|e| BlockRejection::Malformed(e.to_string()))? {
        Some(LedgerOp::SetLeadValidator(_)) => {}
        Some(LedgerOp::SubmitBlock(submit)) => {
            let lead = snapshot.lead_validator().ok_or(BlockRejection::NoLeadValidator)?;
            let key = public_key_of(lead).ok_or_else(|| BlockRejection::UnknownLeadKey(lead.clone()))?;
            if !verify_signature(submit.signed_nonce.as_bytes(), &submit.signature, &key) {
                return Err(BlockRejection::BadProposerSignature);
            }
        }
        _ => return Err(BlockRejection::Unauthenticated),
    }

    let mut scratch = snapshot.clone();
    for tx in block.transactions() {
        let Some(op) = LedgerOp::parse(tx).map_err(|e| BlockRejection::Malformed(e.to_string()))? else {
            continue;
        };
        if let LedgerOp::AddVote(vote) = &op {
            verify_vote(&scratch, &VoteMessage::from(vote))?;
        }
        apply_op(&mut scratch, &op);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::AddVote;
    use crate::vote::sign_vote;
    use ballot_crypto::{ElectorKeypair, NodeKeypair};
    use ballot_ledger::Transaction;
    use serde_json::json;

    struct Fixture {
        lead_key: NodeKeypair,
        elector: ElectorKeypair,
        snapshot: Snapshot,
    }

    fn fixture() -> Fixture {
        let lead_key = NodeKeypair::generate();
        let elector = ElectorKeypair::generate();
        let mut snapshot = Snapshot::new();
        snapshot.add_validator(NodeId::from("lead"));
        snapshot.set_lead_validator(Some(NodeId::from("lead")));
        snapshot.add_candidate(1, "A");
        snapshot.add_elector(&elector.public_key_hex());
        Fixture {
            lead_key,
            elector,
            snapshot,
        }
    }

    fn lookup(f: &Fixture) -> impl Fn(&NodeId) -> Option<String> + '_ {
        move |id: &NodeId| (id.as_str() == "lead").then(|| f.lead_key.public_key_hex())
    }

    fn push(block: &mut Block, op: LedgerOp) {
        block.add_transaction(op.to_transaction().unwrap());
    }

    #[test]
    fn signed_block_from_lead_is_accepted() {
        let f = fixture();
        let mut block = Block::new();
        push(&mut block, LedgerOp::AddVote(AddVote::from(&sign_vote(&f.elector, 1).unwrap())));
        push(&mut block, LedgerOp::submit_block(NodeId::from("lead"), &f.lead_key));
        assert_eq!(verify_proposed_block(&f.snapshot, lookup(&f), &block), Ok(()));
    }

    #[test]
    fn block_signed_by_someone_else_is_rejected() {
        let f = fixture();
        let impostor = NodeKeypair::generate();
        let mut block = Block::new();
        push(&mut block, LedgerOp::submit_block(NodeId::from("lead"), &impostor));
        assert_eq!(
            verify_proposed_block(&f.snapshot, lookup(&f), &block),
            Err(BlockRejection::BadProposerSignature)
        );
    }

    #[test]
    fn lead_change_needs_no_signature() {
        let f = fixture();
        let mut block = Block::new();
        push(&mut block, LedgerOp::set_lead_validator(NodeId::from("other")));
        assert_eq!(verify_proposed_block(&f.snapshot, lookup(&f), &block), Ok(()));
    }

    #[test]
    fn empty_and_unauthenticated_blocks_are_rejected() {
        let f = fixture();
        assert_eq!(
            verify_proposed_block(&f.snapshot, lookup(&f), &Block::new()),
            Err(BlockRejection::Empty)
        );
        let mut block = Block::new();
        block.add_transaction(Transaction::new("NOTE", json!({})));
        assert_eq!(
            verify_proposed_block(&f.snapshot, lookup(&f), &block),
            Err(BlockRejection::Unauthenticated)
        );
    }

    #[test]
    fn double_vote_inside_one_block_is_rejected() {
        let f = fixture();
        let mut block = Block::new();
        push(&mut block, LedgerOp::AddVote(AddVote::from(&sign_vote(&f.elector, 1).unwrap())));
        push(&mut block, LedgerOp::AddVote(AddVote::from(&sign_vote(&f.elector, 1).unwrap())));
        push(&mut block, LedgerOp::submit_block(NodeId::from("lead"), &f.lead_key));
        assert_eq!(
            verify_proposed_block(&f.snapshot, lookup(&f), &block),
            Err(BlockRejection::Vote(VoteRejection::AlreadyVoted))
        );
    }

    #[test]
    fn unknown_lead_key_is_rejected() {
        let f = fixture();
        let mut block = Block::new();
        push(&mut block, LedgerOp::submit_block(NodeId::from("lead"), &f.lead_key));
        assert_eq!(
            verify_proposed_block(&f.snapshot, |_: &NodeId| None, &block),
            Err(BlockRejection::UnknownLeadKey(NodeId::from("lead")))
        );
    }
}
