//! Typed ledger operations.
//!
//! The ledger stores transactions as an opaque tag plus JSON. This module
//! is the one place that gives those tags meaning.

use ballot_crypto::{sign_message, NodeKeypair};
use ballot_ledger::Transaction;
use ballot_types::NodeId;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ConsensusError;

pub const ADD_VALIDATOR: &str = "ADD_VALIDATOR";
pub const SET_LEAD_VALIDATOR: &str = "SET_LEAD_VALIDATOR";
pub const ADD_CANDIDATE: &str = "ADD_CANDIDATE";
pub const ADD_ELECTOR: &str = "ADD_ELECTOR";
pub const ADD_VOTE: &str = "ADD_VOTE";
pub const SUBMIT_BLOCK: &str = "SUBMIT_BLOCK";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddValidator {
    pub node_id: NodeId,
    pub signed_data: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetLeadValidator {
    pub node_id: NodeId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddCandidate {
    pub candidate_name: String,
    pub candidate_id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddElector {
    pub elector_public_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddVote {
    pub vote_choice: u64,
    pub voter_public_key: String,
    pub vote_signature: String,
    pub nonce: String,
}

/// Proof that the lead validator authored a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitBlock {
    pub node_id: NodeId,
    pub signed_nonce: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LedgerOp {
    AddValidator(AddValidator),
    SetLeadValidator(SetLeadValidator),
    AddCandidate(AddCandidate),
    AddElector(AddElector),
    AddVote(AddVote),
    SubmitBlock(SubmitBlock),
}

fn decode<T: DeserializeOwned>(tx: &Transaction) -> Result<T, ConsensusError> {
    T::deserialize(tx.data()).map_err(|e| ConsensusError::MalformedTransaction {
        operation: tx.operation().to_string(),
        reason: e.to_string(),
    })
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl LedgerOp {
    /// Interpret a transaction. `Ok(None)` means the tag carries no
    /// consensus meaning (arbitrary operator transactions are allowed).
    pub fn parse(tx: &Transaction) -> Result<Option<Self>, ConsensusError> {
        Ok(Some(match tx.operation() {
            ADD_VALIDATOR => Self::AddValidator(decode(tx)?),
            SET_LEAD_VALIDATOR => Self::SetLeadValidator(decode(tx)?),
            ADD_CANDIDATE => Self::AddCandidate(decode(tx)?),
            ADD_ELECTOR => Self::AddElector(decode(tx)?),
            ADD_VOTE => Self::AddVote(decode(tx)?),
            SUBMIT_BLOCK => Self::SubmitBlock(decode(tx)?),
            _ => return Ok(None),
        }))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::AddValidator(_) => ADD_VALIDATOR,
            Self::SetLeadValidator(_) => SET_LEAD_VALIDATOR,
            Self::AddCandidate(_) => ADD_CANDIDATE,
            Self::AddElector(_) => ADD_ELECTOR,
            Self::AddVote(_) => ADD_VOTE,
            Self::SubmitBlock(_) => SUBMIT_BLOCK,
        }
    }

    pub fn to_transaction(&self) -> Result<Transaction, ConsensusError> {
        let data = match self {
            Self::AddValidator(op) => serde_json::to_value(op),
            Self::SetLeadValidator(op) => serde_json::to_value(op),
            Self::AddCandidate(op) => serde_json::to_value(op),
            Self::AddElector(op) => serde_json::to_value(op),
            Self::AddVote(op) => serde_json::to_value(op),
            Self::SubmitBlock(op) => serde_json::to_value(op),
        }
        .map_err(|e| ConsensusError::MalformedTransaction {
            operation: self.operation().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Transaction::new(self.operation(), data))
    }

    /// `ADD_VALIDATOR` for `node_id`, signed by the lead.
    pub fn add_validator(node_id: NodeId, lead: &NodeKeypair) -> Self {
        let signature = sign_message(node_id.as_str().as_bytes(), lead);
        Self::AddValidator(AddValidator {
            signed_data: node_id.to_string(),
            node_id,
            signature,
        })
    }

    pub fn set_lead_validator(node_id: NodeId) -> Self {
        Self::SetLeadValidator(SetLeadValidator { node_id })
    }

    /// `SUBMIT_BLOCK` with a fresh nonce signed by the proposer.
    pub fn submit_block(node_id: NodeId, proposer: &NodeKeypair) -> Self {
        let signed_nonce = random_nonce();
        let signature = sign_message(signed_nonce.as_bytes(), proposer);
        Self::SubmitBlock(SubmitBlock {
            node_id,
            signed_nonce,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_through_transaction() {
        let kp = NodeKeypair::generate();
        let ops = vec![
            LedgerOp::add_validator(NodeId::from("b"), &kp),
            LedgerOp::set_lead_validator(NodeId::from("b")),
            LedgerOp::AddCandidate(AddCandidate {
                candidate_name: "A".into(),
                candidate_id: 1,
            }),
            LedgerOp::AddElector(AddElector {
                elector_public_key: "02ab".into(),
            }),
            LedgerOp::submit_block(NodeId::from("a"), &kp),
        ];
        for op in ops {
            let tx = op.to_transaction().unwrap();
            assert_eq!(tx.operation(), op.operation());
            assert_eq!(LedgerOp::parse(&tx).unwrap(), Some(op));
        }
    }

    #[test]
    fn unknown_operations_are_ignored() {
        let tx = Transaction::new("TEST", json!({"anything": 1}));
        assert_eq!(LedgerOp::parse(&tx).unwrap(), None);
    }

    #[test]
    fn malformed_known_operation_is_an_error() {
        let tx = Transaction::new(ADD_CANDIDATE, json!({"candidate_name": 5}));
        assert!(matches!(
            LedgerOp::parse(&tx),
            Err(ConsensusError::MalformedTransaction { .. })
        ));
    }

    #[test]
    fn submit_block_signature_covers_nonce() {
        let kp = NodeKeypair::generate();
        let LedgerOp::SubmitBlock(submit) = LedgerOp::submit_block(NodeId::from("a"), &kp) else {
            unreachable!()
        };
        assert!(ballot_crypto::verify_signature(
            submit.signed_nonce.as_bytes(),
            &submit.signature,
            &kp.public_key_hex()
        ));
    }
}
