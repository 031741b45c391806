//! Cryptographic primitives for the ballot network.
//!
//! - **Ed25519** for node identity: every envelope is signed by its sender
//! - **secp256k1 ECDSA** for elector identity, kept apart from node keys
//! - **SHA-256** for content hashes (transactions, blocks, snapshots, message ids)
//! - **X25519 + ChaCha20-Poly1305** for sealing the bootstrap join request
//!
//! Keys, signatures and digests cross crate boundaries as lowercase hex.

pub mod elector;
pub mod encryption;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use elector::{verify_elector_signature, ElectorKeypair};
pub use encryption::{open_sealed, seal_to, HandshakeKey};
pub use error::CryptoError;
pub use hash::{blake2b_256_multi, derive_node_id, sha256, sha256_hex, sha256_hex_multi};
pub use keys::NodeKeypair;
pub use sign::{sign_message, verify_signature};
