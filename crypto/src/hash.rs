//! Content hashing.
//!
//! SHA-256 (hex encoded) identifies ledger content and messages. Blake2b is
//! only used to derive symmetric keys from Diffie-Hellman output.

use ballot_types::NodeId;
use blake2::digest::consts::U32;
use blake2::Blake2b;
use sha2::{Digest, Sha256};

type Blake2b256 = Blake2b<U32>;

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA-256 over several byte slices in sequence (avoids concatenation allocation).
pub fn sha256_hex_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Raw SHA-256 digest bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Blake2b-256 over several byte slices.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Derive a node identity from its hex-encoded public key.
pub fn derive_node_id(public_key_hex: &str) -> NodeId {
    let digest = sha256_hex(public_key_hex.as_bytes());
    NodeId::new(&digest[..NodeId::DERIVED_LEN])
}
