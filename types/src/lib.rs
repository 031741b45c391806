//! Fundamental types for the ballot network.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: node identities, content hashes, peer addresses and timestamps.

pub mod address;
pub mod hash;
pub mod node;
pub mod time;

pub use address::PeerAddress;
pub use hash::{BlockHash, TxHash};
pub use node::NodeId;
pub use time::Timestamp;
