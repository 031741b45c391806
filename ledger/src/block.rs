//! Blocks: ordered transaction lists linked by `previous_hash`.

use ballot_types::BlockHash;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Transaction};

/// A block of transactions.
///
/// The hash covers the parent hash and the canonical form of every
/// transaction in order, and is recomputed on every mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BlockRepr")]
pub struct Block {
    hash: BlockHash,
    previous_hash: BlockHash,
    data: Vec<Transaction>,
}

#[derive(Deserialize)]
struct BlockRepr {
    #[serde(default)]
    hash: Option<BlockHash>,
    #[serde(default)]
    previous_hash: BlockHash,
    #[serde(default)]
    data: Vec<Transaction>,
}

impl TryFrom<BlockRepr> for Block {
    type Error = LedgerError;

    fn try_from(repr: BlockRepr) -> Result<Self, Self::Error> {
        let block = Self::from_parts(repr.previous_hash, repr.data);
        match repr.hash {
            Some(claimed) if claimed != block.hash => Err(LedgerError::HashMismatch {
                claimed: claimed.to_string(),
                computed: block.hash.to_string(),
            }),
            _ => Ok(block),
        }
    }
}

impl Block {
    /// An empty block whose parent is the zero hash.
    pub fn new() -> Self {
        Self::with_previous(BlockHash::zero())
    }

    pub fn with_previous(previous_hash: BlockHash) -> Self {
        Self::from_parts(previous_hash, Vec::new())
    }

    fn from_parts(previous_hash: BlockHash, data: Vec<Transaction>) -> Self {
        let mut block = Self {
            hash: BlockHash::zero(),
            previous_hash,
            data,
        };
        block.rehash();
        block
    }

    fn rehash(&mut self) {
        let txs: Vec<String> = self.data.iter().map(Transaction::canonical_json).collect();
        let mut parts: Vec<&[u8]> = Vec::with_capacity(txs.len() + 1);
        parts.push(self.previous_hash.as_str().as_bytes());
        parts.extend(txs.iter().map(|t| t.as_bytes()));
        self.hash = BlockHash::new(ballot_crypto::sha256_hex_multi(&parts));
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.data.push(tx);
        self.rehash();
    }

    pub fn set_previous_hash(&mut self, previous_hash: BlockHash) {
        self.previous_hash = previous_hash;
        self.rehash();
    }

    pub fn hash(&self) -> &BlockHash {
        &self.hash
    }

    pub fn previous_hash(&self) -> &BlockHash {
        &self.previous_hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.data
    }

    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.data.last()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        crate::canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn tx(op: &str, n: u64) -> Transaction {
        Transaction::new(op, json!({ "n": n }))
    }

    #[test]
    fn empty_blocks_share_a_hash() {
        assert_eq!(Block::new().hash(), Block::default().hash());
        assert!(Block::new().previous_hash().is_zero());
    }

    #[test]
    fn add_transaction_rehashes() {
        let mut block = Block::new();
        let before = block.hash().clone();
        block.add_transaction(tx("T", 1));
        assert_ne!(block.hash(), &before);
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn set_previous_hash_rehashes() {
        let mut block = Block::new();
        block.add_transaction(tx("T", 1));
        let before = block.hash().clone();
        block.set_previous_hash(BlockHash::new("abc"));
        assert_ne!(block.hash(), &before);
        assert_eq!(block.previous_hash().as_str(), "abc");
    }

    #[test]
    fn transaction_order_matters() {
        let mut a = Block::new();
        a.add_transaction(tx("T", 1));
        a.add_transaction(tx("T", 2));
        let mut b = Block::new();
        b.add_transaction(tx("T", 2));
        b.add_transaction(tx("T", 1));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let mut block = Block::new();
        block.add_transaction(tx("T", 1));
        let mut value = serde_json::to_value(&block).unwrap();
        value["hash"] = json!("deadbeef");
        let err = serde_json::from_value::<Block>(value).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn missing_hash_is_computed() {
        let block = Block::from_json(r#"{"previous_hash":"0","data":[]}"#).unwrap();
        assert_eq!(block.hash(), Block::new().hash());
    }

    #[test]
    fn last_transaction_is_most_recent() {
        let mut block = Block::new();
        assert!(block.last_transaction().is_none());
        block.add_transaction(tx("A", 1));
        block.add_transaction(tx("B", 2));
        assert_eq!(block.last_transaction().unwrap().operation(), "B");
    }

    proptest! {
        #[test]
        fn json_roundtrip_preserves_hash(
            prev in "[0-9a-f]{1,64}",
            ops in proptest::collection::vec(("[A-Z_]{1,16}", any::<u64>(), ".*"), 0..8),
        ) {
            let mut block = Block::with_previous(BlockHash::new(prev));
            for (op, n, s) in ops {
                block.add_transaction(Transaction::new(op, json!({ "n": n, "s": s })));
            }
            let back = Block::from_json(&block.to_json().unwrap()).unwrap();
            prop_assert_eq!(back.hash(), block.hash());
            prop_assert_eq!(back, block);
        }
    }
}
