//! The snapshot: a materialized view of election state.
//!
//! The snapshot is a cache over the chain. Every field can be rebuilt by
//! replaying the chain's transactions from genesis, which is exactly what a
//! full chain load does. The snapshot hash is computed deterministically from
//! the validator set, candidates, head and lead validator so peers can compare
//! views cheaply.

use std::collections::{BTreeMap, BTreeSet};

use ballot_types::{BlockHash, NodeId};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// A registered election candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_name: String,
    pub candidate_id: u64,
}

/// A registered elector, keyed in the snapshot by the hash of its public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectorRecord {
    pub public_key: String,
    pub voted: bool,
}

/// Election state derived from the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr")]
pub struct Snapshot {
    blockchain_head: BlockHash,
    validator_addresses: BTreeSet<NodeId>,
    lead_validator: Option<NodeId>,
    election_candidates: BTreeMap<u64, Candidate>,
    vote_tally: BTreeMap<u64, u64>,
    elector_dict: BTreeMap<String, ElectorRecord>,
    hash: String,
}

#[derive(Deserialize)]
struct SnapshotRepr {
    #[serde(default)]
    blockchain_head: BlockHash,
    #[serde(default)]
    validator_addresses: BTreeSet<NodeId>,
    #[serde(default)]
    lead_validator: Option<NodeId>,
    #[serde(default)]
    election_candidates: BTreeMap<u64, Candidate>,
    #[serde(default)]
    vote_tally: BTreeMap<u64, u64>,
    #[serde(default)]
    elector_dict: BTreeMap<String, ElectorRecord>,
}

impl From<SnapshotRepr> for Snapshot {
    fn from(repr: SnapshotRepr) -> Self {
        let mut snapshot = Self {
            blockchain_head: repr.blockchain_head,
            validator_addresses: repr.validator_addresses,
            lead_validator: repr.lead_validator,
            election_candidates: repr.election_candidates,
            vote_tally: repr.vote_tally,
            elector_dict: repr.elector_dict,
            hash: String::new(),
        };
        snapshot.rehash();
        snapshot
    }
}

/// Key under which an elector is stored in the elector dictionary.
pub fn elector_key(public_key: &str) -> String {
    ballot_crypto::sha256_hex(public_key.as_bytes())
}

impl Snapshot {
    pub fn new() -> Self {
        Self::from(SnapshotRepr {
            blockchain_head: BlockHash::zero(),
            validator_addresses: BTreeSet::new(),
            lead_validator: None,
            election_candidates: BTreeMap::new(),
            vote_tally: BTreeMap::new(),
            elector_dict: BTreeMap::new(),
        })
    }

    /// A fresh snapshot positioned at `head`.
    pub fn at_head(head: BlockHash) -> Self {
        let mut snapshot = Self::new();
        snapshot.set_blockchain_head(head);
        snapshot
    }

    fn rehash(&mut self) {
        let validators = serde_json::to_value(&self.validator_addresses)
            .unwrap_or_default()
            .to_string();
        let candidates = serde_json::to_value(&self.election_candidates)
            .unwrap_or_default()
            .to_string();
        let lead = self
            .lead_validator
            .as_ref()
            .map_or(BlockHash::ZERO, NodeId::as_str);
        self.hash = ballot_crypto::sha256_hex_multi(&[
            validators.as_bytes(),
            b",",
            candidates.as_bytes(),
            b",",
            self.blockchain_head.as_str().as_bytes(),
            b",",
            lead.as_bytes(),
        ]);
    }

    /// Clear all election state, keeping nothing but a zero head.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn blockchain_head(&self) -> &BlockHash {
        &self.blockchain_head
    }

    pub fn set_blockchain_head(&mut self, head: BlockHash) {
        self.blockchain_head = head;
        self.rehash();
    }

    /// Validators in lexicographic order.
    pub fn validators(&self) -> impl Iterator<Item = &NodeId> {
        self.validator_addresses.iter()
    }

    pub fn validator_count(&self) -> usize {
        self.validator_addresses.len()
    }

    pub fn is_validator(&self, node_id: &NodeId) -> bool {
        self.validator_addresses.contains(node_id)
    }

    /// Returns `true` if the validator was not already present.
    pub fn add_validator(&mut self, node_id: NodeId) -> bool {
        let inserted = self.validator_addresses.insert(node_id);
        self.rehash();
        inserted
    }

    pub fn lead_validator(&self) -> Option<&NodeId> {
        self.lead_validator.as_ref()
    }

    pub fn set_lead_validator(&mut self, node_id: Option<NodeId>) {
        self.lead_validator = node_id;
        self.rehash();
    }

    pub fn candidates(&self) -> &BTreeMap<u64, Candidate> {
        &self.election_candidates
    }

    pub fn candidate(&self, candidate_id: u64) -> Option<&Candidate> {
        self.election_candidates.get(&candidate_id)
    }

    /// Highest assigned candidate id, or 0 when there are none.
    pub fn highest_candidate_id(&self) -> u64 {
        self.election_candidates.keys().next_back().copied().unwrap_or(0)
    }

    pub fn add_candidate(&mut self, candidate_id: u64, name: impl Into<String>) {
        self.election_candidates.insert(
            candidate_id,
            Candidate {
                candidate_name: name.into(),
                candidate_id,
            },
        );
        self.vote_tally.entry(candidate_id).or_insert(0);
        self.rehash();
    }

    pub fn vote_tally(&self) -> &BTreeMap<u64, u64> {
        &self.vote_tally
    }

    pub fn votes_for(&self, candidate_id: u64) -> u64 {
        self.vote_tally.get(&candidate_id).copied().unwrap_or(0)
    }

    pub fn electors(&self) -> &BTreeMap<String, ElectorRecord> {
        &self.elector_dict
    }

    pub fn add_elector(&mut self, public_key: &str) {
        self.elector_dict
            .entry(elector_key(public_key))
            .or_insert_with(|| ElectorRecord {
                public_key: public_key.to_string(),
                voted: false,
            });
    }

    pub fn is_elector_registered(&self, public_key: &str) -> bool {
        self.elector_dict.contains_key(&elector_key(public_key))
    }

    pub fn has_elector_voted(&self, public_key: &str) -> bool {
        self.elector_dict
            .get(&elector_key(public_key))
            .is_some_and(|e| e.voted)
    }

    /// Count a vote: mark the elector as voted and bump the tally.
    ///
    /// The caller is responsible for verifying the vote first; an unknown
    /// elector is still counted so replay matches what was finalized.
    pub fn record_vote(&mut self, candidate_id: u64, voter_public_key: &str) {
        if let Some(record) = self.elector_dict.get_mut(&elector_key(voter_public_key)) {
            record.voted = true;
        }
        *self.vote_tally.entry(candidate_id).or_insert(0) += 1;
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        crate::canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_is_empty() {
        let snap = Snapshot::new();
        assert!(snap.blockchain_head().is_zero());
        assert_eq!(snap.validator_count(), 0);
        assert!(snap.lead_validator().is_none());
        assert_eq!(snap.highest_candidate_id(), 0);
        assert!(!snap.hash().is_empty());
    }

    #[test]
    fn hash_tracks_validators_and_lead() {
        let mut snap = Snapshot::new();
        let h0 = snap.hash().to_string();
        snap.add_validator(NodeId::from("a"));
        let h1 = snap.hash().to_string();
        assert_ne!(h0, h1);
        snap.set_lead_validator(Some(NodeId::from("a")));
        assert_ne!(snap.hash(), h1);
    }

    #[test]
    fn hash_ignores_electors_and_tally() {
        let mut snap = Snapshot::new();
        snap.add_candidate(1, "A");
        let before = snap.hash().to_string();
        snap.add_elector("02abcd");
        snap.record_vote(1, "02abcd");
        assert_eq!(snap.hash(), before);
    }

    #[test]
    fn validators_are_deduplicated_and_sorted() {
        let mut snap = Snapshot::new();
        assert!(snap.add_validator(NodeId::from("b")));
        assert!(snap.add_validator(NodeId::from("a")));
        assert!(!snap.add_validator(NodeId::from("b")));
        let ids: Vec<&str> = snap.validators().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn elector_lifecycle() {
        let mut snap = Snapshot::new();
        assert!(!snap.is_elector_registered("pk"));
        snap.add_elector("pk");
        assert!(snap.is_elector_registered("pk"));
        assert!(!snap.has_elector_voted("pk"));
        snap.add_candidate(3, "C");
        snap.record_vote(3, "pk");
        assert!(snap.has_elector_voted("pk"));
        assert_eq!(snap.votes_for(3), 1);
    }

    #[test]
    fn re_adding_an_elector_keeps_voted_flag() {
        let mut snap = Snapshot::new();
        snap.add_elector("pk");
        snap.record_vote(1, "pk");
        snap.add_elector("pk");
        assert!(snap.has_elector_voted("pk"));
    }

    #[test]
    fn highest_candidate_id_is_max_key() {
        let mut snap = Snapshot::new();
        snap.add_candidate(2, "B");
        snap.add_candidate(7, "G");
        snap.add_candidate(4, "D");
        assert_eq!(snap.highest_candidate_id(), 7);
        assert_eq!(snap.votes_for(7), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut snap = Snapshot::at_head(BlockHash::new("ff"));
        snap.add_validator(NodeId::from("a"));
        snap.set_lead_validator(Some(NodeId::from("a")));
        snap.add_candidate(1, "A");
        snap.add_elector("pk");
        snap.reset();
        assert_eq!(snap, Snapshot::new());
    }

    #[test]
    fn json_roundtrip_preserves_everything() {
        let mut snap = Snapshot::at_head(BlockHash::new("abc"));
        snap.add_validator(NodeId::from("a"));
        snap.set_lead_validator(Some(NodeId::from("a")));
        snap.add_candidate(1, "A");
        snap.add_elector("pk");
        snap.record_vote(1, "pk");
        let back = Snapshot::from_json(&snap.to_json().unwrap()).unwrap();
        assert_eq!(back, snap);
        assert_eq!(back.hash(), snap.hash());
    }
}
