//! The election ledger model.
//!
//! - [`Transaction`]: an operation tag plus an opaque JSON payload
//! - [`Block`]: an ordered list of transactions linked to its parent by hash
//! - [`Chain`]: the append-only list of finalized blocks
//! - [`Snapshot`]: the materialized view of election state derived from the chain
//!
//! Every type has a canonical JSON form (sorted keys) that is used both for
//! hashing and for wire transfer. Hashes are always a pure function of the
//! current content; nothing here caches a stale digest.
//!
//! Operation tags are opaque at this layer. Their meaning (validator
//! promotion, votes, candidates) lives in `ballot-consensus`.

pub mod block;
pub mod chain;
pub mod error;
pub mod snapshot;
pub mod transaction;

pub use block::Block;
pub use chain::Chain;
pub use error::LedgerError;
pub use snapshot::{Candidate, ElectorRecord, Snapshot};
pub use transaction::Transaction;

/// Serialize any value to canonical JSON (object keys sorted).
///
/// `serde_json::Value` keeps object keys in a `BTreeMap`, so routing through
/// it yields a key order that is independent of struct field order.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> Result<String, LedgerError> {
    let value = serde_json::to_value(value).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Unsorted {
        zeta: u8,
        alpha: u8,
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let json = canonical_json(&Unsorted { zeta: 1, alpha: 2 }).unwrap();
        assert_eq!(json, r#"{"alpha":2,"zeta":1}"#);
    }
}
