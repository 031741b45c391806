//! Ledger transactions.

use ballot_types::TxHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LedgerError;

/// A single ledger operation: an opaque tag and its key/value payload.
///
/// Transactions are create-once. The hash is computed at construction and
/// recomputed on deserialization, so a claimed hash on the wire is ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransactionRepr")]
pub struct Transaction {
    operation: String,
    data: Value,
    hash: TxHash,
}

#[derive(Deserialize)]
struct TransactionRepr {
    operation: String,
    #[serde(default)]
    data: Value,
}

impl From<TransactionRepr> for Transaction {
    fn from(repr: TransactionRepr) -> Self {
        Self::new(repr.operation, repr.data)
    }
}

impl Transaction {
    pub fn new(operation: impl Into<String>, data: Value) -> Self {
        let operation = operation.into();
        let hash = Self::compute_hash(&operation, &data);
        Self {
            operation,
            data,
            hash,
        }
    }

    fn compute_hash(operation: &str, data: &Value) -> TxHash {
        let data_json = data.to_string();
        TxHash::new(ballot_crypto::sha256_hex_multi(&[
            operation.as_bytes(),
            data_json.as_bytes(),
        ]))
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn hash(&self) -> &TxHash {
        &self.hash
    }

    /// Canonical `{data, operation}` form that feeds the enclosing block's hash.
    pub fn canonical_json(&self) -> String {
        serde_json::json!({
            "operation": self.operation,
            "data": self.data,
        })
        .to_string()
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        crate::canonical_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}
