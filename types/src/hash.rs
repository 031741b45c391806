//! Content hash types for transactions and blocks.
//!
//! Hashes travel as lowercase hex strings on the wire and inside the
//! canonical JSON used for hashing, so the newtypes wrap the hex form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded digest of a block's content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    /// Sentinel `previous_hash` of a block that has no parent.
    pub const ZERO: &'static str = "0";

    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The parent hash used by genesis and freshly allocated blocks.
    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlockHash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "BlockHash({short})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded digest of a transaction's operation and data.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "TxHash({short})")
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
