//! Consensus for the election ledger.
//!
//! A single lead validator authors blocks on a fixed period. Validators
//! verify and relay them, and elect a new lead deterministically when the
//! head stops moving. Normal nodes accept a block once enough validators
//! have announced it.
//!
//! This crate is the pure state machine. Timers, sockets and task
//! supervision live in `ballot-node`.

pub mod block_check;
pub mod error;
pub mod leader;
pub mod ops;
pub mod quorum;
pub mod replay;
pub mod role;
pub mod state;
pub mod vote;

pub use block_check::{verify_proposed_block, BlockRejection};
pub use error::ConsensusError;
pub use leader::{select_lead_validator, validator_threshold};
pub use ops::LedgerOp;
pub use quorum::BlockQuorum;
pub use replay::{apply_op, replay_chain, SnapshotChange};
pub use role::{role_changes, NodeRole, RoleChange};
pub use state::{Finalized, LedgerEffect, LedgerState};
pub use vote::{sign_vote, verify_vote, vote_signing_bytes, VoteRejection};
