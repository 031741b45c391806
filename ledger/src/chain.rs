//! The finalized chain of blocks.

use ballot_types::BlockHash;
use serde::{Deserialize, Serialize};

use crate::{Block, LedgerError};

/// Append-only list of finalized blocks plus the hash of the latest one.
///
/// Linkage (`chain[i].previous_hash == chain[i - 1].hash`) is checked by
/// [`Chain::verify_chain_integrity`] rather than enforced on every append,
/// because finalization links blocks to the snapshot head explicitly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    head: BlockHash,
    chain: Vec<Block>,
}

impl Chain {
    /// An empty chain with a zero head.
    pub fn new() -> Self {
        Self {
            head: BlockHash::zero(),
            chain: Vec::new(),
        }
    }

    /// A chain holding only the deterministic empty genesis block.
    pub fn with_genesis() -> Self {
        let mut chain = Self::new();
        chain.add_genesis_block(Block::new());
        chain
    }

    /// Append `block` as the first block, parented on the zero hash.
    pub fn add_genesis_block(&mut self, mut block: Block) {
        block.set_previous_hash(BlockHash::zero());
        self.push(block);
    }

    /// Append `block`, relinking it to the current last block.
    pub fn add_block(&mut self, mut block: Block) {
        if let Some(last) = self.chain.last() {
            block.set_previous_hash(last.hash().clone());
        }
        self.push(block);
    }

    /// Append `block` exactly as given; its `previous_hash` is not touched.
    pub fn append_unlinked(&mut self, block: Block) {
        self.push(block);
    }

    fn push(&mut self, block: Block) {
        self.head = block.hash().clone();
        self.chain.push(block);
    }

    pub fn head(&self) -> &BlockHash {
        &self.head
    }

    pub fn set_head(&mut self, head: BlockHash) {
        self.head = head;
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Walk consecutive blocks and confirm each links to its predecessor.
    pub fn verify_chain_integrity(&self) -> bool {
        self.chain
            .windows(2)
            .all(|pair| pair[1].previous_hash() == pair[0].hash())
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        crate::canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use proptest::prelude::*;
    use serde_json::json;

    fn block_with(n: u64) -> Block {
        let mut block = Block::new();
        block.add_transaction(Transaction::new("T", json!({ "n": n })));
        block
    }

    #[test]
    fn genesis_is_deterministic() {
        let a = Chain::with_genesis();
        let b = Chain::with_genesis();
        assert_eq!(a.head(), b.head());
        assert_eq!(a.len(), 1);
        assert!(a.blocks()[0].previous_hash().is_zero());
    }

    #[test]
    fn add_block_links_to_last() {
        let mut chain = Chain::with_genesis();
        chain.add_block(block_with(1));
        chain.add_block(block_with(2));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.blocks()[2].previous_hash(), chain.blocks()[1].hash());
        assert_eq!(chain.head(), chain.last_block().unwrap().hash());
        assert!(chain.verify_chain_integrity());
    }

    #[test]
    fn unlinked_append_keeps_previous_hash() {
        let mut chain = Chain::with_genesis();
        let mut block = block_with(1);
        block.set_previous_hash(BlockHash::new("elsewhere"));
        chain.append_unlinked(block);
        assert_eq!(chain.last_block().unwrap().previous_hash().as_str(), "elsewhere");
        assert!(!chain.verify_chain_integrity());
    }

    #[test]
    fn tampering_an_interior_block_breaks_integrity() {
        let mut chain = Chain::with_genesis();
        for n in 0..4 {
            chain.add_block(block_with(n));
        }
        assert!(chain.verify_chain_integrity());
        chain.chain[2].add_transaction(Transaction::new("TAMPER", json!({})));
        assert!(!chain.verify_chain_integrity());
    }

    #[test]
    fn empty_and_single_block_chains_are_intact() {
        assert!(Chain::new().verify_chain_integrity());
        assert!(Chain::with_genesis().verify_chain_integrity());
    }

    #[test]
    fn serializes_head_and_chain() {
        let chain = Chain::with_genesis();
        let value = serde_json::to_value(&chain).unwrap();
        assert!(value.get("head").is_some());
        assert!(value.get("chain").unwrap().is_array());
    }

    proptest! {
        #[test]
        fn sequential_chains_are_intact_and_roundtrip(ns in proptest::collection::vec(any::<u64>(), 0..12)) {
            let mut chain = Chain::with_genesis();
            for n in ns {
                chain.add_block(block_with(n));
            }
            prop_assert!(chain.verify_chain_integrity());
            let back = Chain::from_json(&chain.to_json().unwrap()).unwrap();
            prop_assert_eq!(back.head(), chain.head());
            prop_assert_eq!(back, chain);
        }
    }
}
