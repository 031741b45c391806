//! Peer directory: node identity to public key.
//!
//! The directory only grows. The first key learned for an identity sticks;
//! later gossip cannot rebind it.

use std::collections::BTreeMap;

use ballot_types::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectoryInsert {
    Added,
    Unchanged,
    /// The identity is already bound to a different key; the old binding stays.
    Conflict,
}

#[derive(Clone, Debug, Default)]
pub struct PeerDirectory {
    keys: BTreeMap<NodeId, String>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: NodeId, public_key: String) -> DirectoryInsert {
        match self.keys.get(&node_id) {
            Some(existing) if *existing == public_key => DirectoryInsert::Unchanged,
            Some(_) => DirectoryInsert::Conflict,
            None => {
                self.keys.insert(node_id, public_key);
                DirectoryInsert::Added
            }
        }
    }

    /// Merge a gossiped directory. Returns the number of new identities.
    pub fn merge(&mut self, incoming: &BTreeMap<NodeId, String>) -> usize {
        incoming
            .iter()
            .filter(|(id, key)| self.insert((*id).clone(), (*key).clone()) == DirectoryInsert::Added)
            .count()
    }

    pub fn public_key(&self, node_id: &NodeId) -> Option<&str> {
        self.keys.get(node_id).map(String::as_str)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.keys.contains_key(node_id)
    }

    pub fn entries(&self) -> &BTreeMap<NodeId, String> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
