//! Node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a node on the network.
///
/// Normally the first 16 hex characters of the SHA-256 digest of the node's
/// public key (see `ballot_crypto::derive_node_id`), but any string is
/// accepted so operators can pin readable ids in test topologies.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Number of hex characters kept from the public-key digest.
    pub const DERIVED_LEN: usize = 16;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_order_lexicographically() {
        let mut ids = vec![NodeId::from("c"), NodeId::from("a"), NodeId::from("b")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("c")]);
    }
}
