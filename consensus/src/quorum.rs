//! Follower-side block acceptance.

use std::collections::{BTreeSet, HashMap};

use ballot_ledger::Block;
use ballot_types::{BlockHash, NodeId};

/// Counts `NEW_BLOCK_ADDED` announcements per block hash on normal nodes.
///
/// Only senders in the validator set count, and each validator counts once
/// per block. The first block to reach the threshold wins; all pending counts
/// are then discarded because competing blocks at the same height are stale.
#[derive(Debug, Default)]
pub struct BlockQuorum {
    pending: HashMap<BlockHash, PendingBlock>,
}

#[derive(Debug)]
struct PendingBlock {
    block: Block,
    senders: BTreeSet<NodeId>,
}

impl BlockQuorum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Returns the block once `threshold` distinct
    /// validators have announced it.
    pub fn record(&mut self, sender: &NodeId, block: Block, threshold: usize) -> Option<Block> {
        let entry = self
            .pending
            .entry(block.hash().clone())
            .or_insert_with(|| PendingBlock {
                block,
                senders: BTreeSet::new(),
            });
        entry.senders.insert(sender.clone());
        if entry.senders.len() < threshold {
            return None;
        }
        let hash = entry.block.hash().clone();
        let accepted = self.pending.remove(&hash).map(|p| p.block);
        self.pending.clear();
        accepted
    }

    pub fn votes_for(&self, hash: &BlockHash) -> usize {
        self.pending.get(hash).map_or(0, |p| p.senders.len())
    }

    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
