//! The node's ledger state: chain, snapshot, working block and role.
//!
//! Everything here is synchronous. The node wraps one `LedgerState` in a
//! mutex and turns the returned effects into events and task changes.

use std::time::{Duration, Instant};

use ballot_ledger::{Block, Chain, Snapshot, Transaction};
use ballot_types::{BlockHash, NodeId};
use tracing::{debug, warn};

use crate::ops::{LedgerOp, ADD_CANDIDATE, ADD_VOTE};
use crate::replay::{apply_op, replay_chain, SnapshotChange};
use crate::role::{role_changes, NodeRole, RoleChange};
use crate::ConsensusError;

/// Something finalizing a block changed.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerEffect {
    Snapshot(SnapshotChange),
    /// A vote cast with this node's own elector key was finalized.
    OwnVoteDetected { block_hash: BlockHash },
    Role(RoleChange),
}

/// Result of a successful finalization.
#[derive(Clone, Debug)]
pub struct Finalized {
    pub block: Block,
    pub effects: Vec<LedgerEffect>,
}

#[derive(Debug)]
pub struct LedgerState {
    local_id: NodeId,
    role: NodeRole,
    chain: Chain,
    snapshot: Snapshot,
    working_block: Block,
    chain_lock: Option<Instant>,
    chain_sync_timeout: Duration,
    elector_public_key: Option<String>,
}

impl LedgerState {
    /// A fresh state holding only the genesis block.
    pub fn new(local_id: NodeId, chain_sync_timeout: Duration) -> Self {
        let chain = Chain::with_genesis();
        let snapshot = Snapshot::at_head(chain.head().clone());
        let working_block = Block::with_previous(chain.head().clone());
        Self {
            local_id,
            role: NodeRole::Normal,
            chain,
            snapshot,
            working_block,
            chain_lock: None,
            chain_sync_timeout,
            elector_public_key: None,
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn working_block(&self) -> &Block {
        &self.working_block
    }

    pub fn set_elector_public_key(&mut self, public_key: Option<String>) {
        self.elector_public_key = public_key;
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.working_block.add_transaction(tx);
    }

    pub fn add_op(&mut self, op: &LedgerOp) -> Result<(), ConsensusError> {
        let tx = op.to_transaction()?;
        self.add_transaction(tx);
        Ok(())
    }

    /// Candidates already queued in the working block.
    pub fn pending_candidates(&self) -> u64 {
        self.working_block
            .transactions()
            .iter()
            .filter(|tx| tx.operation() == ADD_CANDIDATE)
            .count() as u64
    }

    /// Id for the next candidate: highest finalized id plus pending ones, plus one.
    pub fn next_candidate_id(&self) -> u64 {
        self.snapshot.highest_candidate_id() + self.pending_candidates() + 1
    }

    /// Whether the working block already holds a vote from this elector.
    pub fn has_pending_vote(&self, elector_public_key: &str) -> bool {
        self.working_block.transactions().iter().any(|tx| {
            tx.operation() == ADD_VOTE
                && matches!(
                    LedgerOp::parse(tx),
                    Ok(Some(LedgerOp::AddVote(ref vote))) if vote.voter_public_key == elector_public_key
                )
        })
    }

    /// Take the chain-load lock. Finalization is suspended until a full
    /// chain arrives or the lock expires.
    pub fn begin_chain_sync(&mut self) {
        self.chain_lock = Some(Instant::now());
    }

    pub fn is_chain_locked(&self) -> bool {
        self.chain_lock
            .is_some_and(|since| since.elapsed() < self.chain_sync_timeout)
    }

    /// Link the working block to the snapshot head, append it, replay its
    /// transactions and start a new working block.
    ///
    /// Returns `None` while a chain load is in progress.
    pub fn finalize_block(&mut self) -> Option<Finalized> {
        if self.is_chain_locked() {
            debug!("finalize skipped: chain load in progress");
            return None;
        }
        self.chain_lock = None;

        let mut block = std::mem::take(&mut self.working_block);
        block.set_previous_hash(self.snapshot.blockchain_head().clone());
        self.chain.append_unlinked(block.clone());

        let effects = self.apply_block(&block);
        self.snapshot.set_blockchain_head(block.hash().clone());
        self.working_block = Block::with_previous(block.hash().clone());
        Some(Finalized { block, effects })
    }

    /// Adopt a peer's block as the working block and finalize it.
    ///
    /// A block whose hash is already the head is ignored.
    pub fn load_block(&mut self, block: Block) -> Option<Finalized> {
        if block.hash() == self.snapshot.blockchain_head() {
            return None;
        }
        self.working_block = block;
        self.finalize_block()
    }

    /// Replace the chain wholesale and rebuild the snapshot from it.
    pub fn load_blockchain(&mut self, chain: Chain) -> Result<Vec<RoleChange>, ConsensusError> {
        if !chain.verify_chain_integrity() {
            return Err(ConsensusError::BrokenChain);
        }
        self.snapshot = replay_chain(&chain);
        self.working_block = Block::with_previous(chain.head().clone());
        self.chain = chain;
        self.chain_lock = None;
        Ok(self.adopt_role_from_snapshot())
    }

    /// Replace the snapshot with a peer's copy.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Vec<RoleChange> {
        self.working_block = Block::with_previous(snapshot.blockchain_head().clone());
        self.snapshot = snapshot;
        self.adopt_role_from_snapshot()
    }

    fn adopt_role_from_snapshot(&mut self) -> Vec<RoleChange> {
        let after = if self.snapshot.lead_validator() == Some(&self.local_id) {
            NodeRole::LeadValidator
        } else if self.snapshot.is_validator(&self.local_id) {
            NodeRole::Validator
        } else {
            NodeRole::Normal
        };
        let before = std::mem::replace(&mut self.role, after);
        role_changes(before, after)
    }

    fn apply_block(&mut self, block: &Block) -> Vec<LedgerEffect> {
        let mut effects = Vec::new();
        for tx in block.transactions() {
            let op = match LedgerOp::parse(tx) {
                Ok(Some(op)) => op,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, block = %block.hash(), "skipping malformed transaction");
                    continue;
                }
            };

            let before = self.role;
            self.role = self.next_role(&op);
            effects.extend(role_changes(before, self.role).into_iter().map(LedgerEffect::Role));

            if let LedgerOp::AddVote(vote) = &op {
                if self.elector_public_key.as_deref() == Some(vote.voter_public_key.as_str()) {
                    effects.push(LedgerEffect::OwnVoteDetected {
                        block_hash: block.hash().clone(),
                    });
                }
            }
            if let Some(change) = apply_op(&mut self.snapshot, &op) {
                effects.push(LedgerEffect::Snapshot(change));
            }
        }
        effects
    }

    fn next_role(&self, op: &LedgerOp) -> NodeRole {
        match op {
            LedgerOp::AddValidator(add) if add.node_id == self.local_id && self.role == NodeRole::Normal => {
                NodeRole::Validator
            }
            LedgerOp::SetLeadValidator(set) if set.node_id == self.local_id => NodeRole::LeadValidator,
            LedgerOp::SetLeadValidator(_) if self.role == NodeRole::LeadValidator => NodeRole::Validator,
            _ => self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{AddCandidate, AddElector, AddVote};
    use ballot_crypto::NodeKeypair;
    use serde_json::json;

    fn state(id: &str) -> LedgerState {
        LedgerState::new(NodeId::from(id), Duration::from_secs(10))
    }

    fn bootstrap(state: &mut LedgerState, kp: &NodeKeypair) -> Finalized {
        let me = state.local_id().clone();
        state.add_op(&LedgerOp::add_validator(me.clone(), kp)).unwrap();
        state.add_op(&LedgerOp::set_lead_validator(me)).unwrap();
        state.finalize_block().unwrap()
    }

    #[test]
    fn starts_at_genesis() {
        let s = state("a");
        assert_eq!(s.chain().len(), 1);
        assert_eq!(s.snapshot().blockchain_head(), s.chain().head());
        assert_eq!(s.role(), NodeRole::Normal);
    }

    #[test]
    fn bootstrap_block_promotes_to_lead() {
        let kp = NodeKeypair::generate();
        let mut s = state("a");
        let finalized = bootstrap(&mut s, &kp);
        assert_eq!(s.role(), NodeRole::LeadValidator);
        assert_eq!(s.snapshot().lead_validator(), Some(&NodeId::from("a")));
        assert!(finalized.effects.contains(&LedgerEffect::Role(RoleChange::BecameValidator)));
        assert!(finalized.effects.contains(&LedgerEffect::Role(RoleChange::BecameLeadValidator)));
        assert!(s.chain().verify_chain_integrity());
        assert_eq!(s.snapshot().blockchain_head(), finalized.block.hash());
        assert_eq!(s.working_block().previous_hash(), finalized.block.hash());
    }

    #[test]
    fn lead_steps_down_when_another_is_named() {
        let kp = NodeKeypair::generate();
        let mut s = state("a");
        bootstrap(&mut s, &kp);
        s.add_op(&LedgerOp::set_lead_validator(NodeId::from("b"))).unwrap();
        let finalized = s.finalize_block().unwrap();
        assert_eq!(s.role(), NodeRole::Validator);
        assert!(finalized.effects.contains(&LedgerEffect::Role(RoleChange::SteppedDown)));
    }

    #[test]
    fn finalize_is_suspended_while_chain_locked() {
        let mut s = state("a");
        s.begin_chain_sync();
        assert!(s.is_chain_locked());
        assert!(s.finalize_block().is_none());
        assert_eq!(s.chain().len(), 1);
    }

    #[test]
    fn chain_lock_expires() {
        let mut s = LedgerState::new(NodeId::from("a"), Duration::ZERO);
        s.begin_chain_sync();
        assert!(!s.is_chain_locked());
        assert!(s.finalize_block().is_some());
    }

    #[test]
    fn load_block_ignores_current_head() {
        let kp = NodeKeypair::generate();
        let mut lead = state("a");
        let block = bootstrap(&mut lead, &kp).block;

        let mut follower = state("b");
        assert!(follower.load_block(block.clone()).is_some());
        assert_eq!(follower.snapshot().blockchain_head(), block.hash());
        assert!(follower.load_block(block).is_none());
        assert_eq!(follower.chain().len(), 2);
    }

    #[test]
    fn followers_track_the_lead_chain() {
        let kp = NodeKeypair::generate();
        let mut lead = state("a");
        let mut follower = state("b");
        follower.load_block(bootstrap(&mut lead, &kp).block).unwrap();
        lead.add_op(&LedgerOp::add_validator(NodeId::from("b"), &kp)).unwrap();
        let finalized = follower.load_block(lead.finalize_block().unwrap().block).unwrap();
        assert_eq!(follower.role(), NodeRole::Validator);
        assert!(finalized.effects.contains(&LedgerEffect::Role(RoleChange::BecameValidator)));
        assert_eq!(follower.chain().head(), lead.chain().head());
    }

    #[test]
    fn candidate_ids_count_pending_additions() {
        let mut s = state("a");
        assert_eq!(s.next_candidate_id(), 1);
        s.add_op(&LedgerOp::AddCandidate(AddCandidate {
            candidate_name: "A".into(),
            candidate_id: 1,
        }))
        .unwrap();
        assert_eq!(s.next_candidate_id(), 2);
        s.finalize_block().unwrap();
        assert_eq!(s.next_candidate_id(), 2);
    }

    #[test]
    fn own_vote_is_detected() {
        let mut s = state("a");
        s.set_elector_public_key(Some("02aa".into()));
        s.add_op(&LedgerOp::AddElector(AddElector {
            elector_public_key: "02aa".into(),
        }))
        .unwrap();
        s.add_op(&LedgerOp::AddVote(AddVote {
            vote_choice: 1,
            voter_public_key: "02aa".into(),
            vote_signature: String::new(),
            nonce: "n".into(),
        }))
        .unwrap();
        assert!(s.has_pending_vote("02aa"));
        let finalized = s.finalize_block().unwrap();
        assert!(finalized
            .effects
            .iter()
            .any(|e| matches!(e, LedgerEffect::OwnVoteDetected { .. })));
        assert!(!s.has_pending_vote("02aa"));
    }

    #[test]
    fn unknown_operations_are_kept_but_ignored() {
        let mut s = state("a");
        s.add_transaction(Transaction::new("NOTE", json!({"text": "hello"})));
        let finalized = s.finalize_block().unwrap();
        assert!(finalized.effects.is_empty());
        assert_eq!(finalized.block.len(), 1);
    }

    #[test]
    fn full_chain_load_rebuilds_snapshot_and_role() {
        let kp = NodeKeypair::generate();
        let mut lead = state("a");
        bootstrap(&mut lead, &kp);
        lead.add_op(&LedgerOp::add_validator(NodeId::from("b"), &kp)).unwrap();
        lead.finalize_block().unwrap();

        let mut follower = state("b");
        follower.begin_chain_sync();
        let changes = follower.load_blockchain(lead.chain().clone()).unwrap();
        assert_eq!(changes, vec![RoleChange::BecameValidator]);
        assert!(!follower.is_chain_locked());
        assert_eq!(follower.snapshot(), lead.snapshot());
    }

    #[test]
    fn snapshot_load_positions_working_block() {
        let kp = NodeKeypair::generate();
        let mut lead = state("a");
        bootstrap(&mut lead, &kp);
        let mut follower = state("b");
        let changes = follower.load_snapshot(lead.snapshot().clone());
        assert!(changes.is_empty());
        assert_eq!(follower.working_block().previous_hash(), lead.chain().head());
    }
}
