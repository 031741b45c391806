//! Network message vocabulary for ballot node-to-node communication.
//!
//! [`MessageCode`] is the closed set of message tags carried in every
//! envelope. [`Payload`] is the typed form of an envelope's `data`, decoded
//! once at the protocol boundary so handlers never touch raw JSON.

pub mod code;
pub mod payload;

pub use code::{MessageCode, UnknownMessageCode};
pub use payload::{
    BasicSnapshot, ConnectionsList, FullChain, GlobalNodes, Heartbeat, JoinAccepted, JoinData,
    JoinRejected, NewBlock, NodeDirectory, NodeRecord, Payload, Proposal, ProposalKind,
    SealedJoin, TextMessage, VoteMessage, VotePackage,
};
