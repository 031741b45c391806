//! Typed message payloads.

use std::collections::BTreeMap;

use ballot_ledger::{Block, Chain, Snapshot};
use ballot_types::{NodeId, PeerAddress, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MessageCode;

/// Plaintext join data: who is asking to join and where it listens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinData {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    pub public_key: String,
}

/// A [`JoinData`] sealed to the network handshake key, hex encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedJoin {
    pub sealed: String,
}

/// A validator's view of where a node can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub host: String,
    pub port: u16,
    pub last_seen: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinAccepted {
    /// The acceptor's whole peer directory (identity -> public key).
    pub discovered_nodes: BTreeMap<NodeId, String>,
    /// The acceptor's current direct connections.
    pub connected_peers: Vec<PeerAddress>,
    /// The acceptor's global node table, present only when it is a validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_peers: Option<BTreeMap<NodeId, NodeRecord>>,
    pub public_key: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinRejected {
    pub reason: String,
    #[serde(default)]
    pub suggested_peers: Vec<PeerAddress>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsList {
    pub connections: Vec<PeerAddress>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDirectory {
    pub nodes: BTreeMap<NodeId, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalNodes {
    pub nodes: BTreeMap<NodeId, NodeRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

/// What an elector signs when casting a vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotePackage {
    pub elector_public_key: String,
    pub choice: u64,
    pub nonce: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub vote_package: VotePackage,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewBlock {
    pub finalized_block: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullChain {
    pub blockchain_data: Chain,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicSnapshot {
    pub snapshot_data: Snapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalKind {
    AddValidator,
}

/// A request addressed to the lead validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub kind: ProposalKind,
    pub node_id: NodeId,
}

/// The decoded `data` of an envelope, one variant per [`MessageCode`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    BootstrapJoinRequest(SealedJoin),
    BootstrapJoinRequestAccepted(JoinAccepted),
    BootstrapJoinRequestRejected(JoinRejected),
    JoinRequest(JoinData),
    JoinRequestAccepted(JoinAccepted),
    JoinRequestRejected(JoinRejected),
    RequestFullBlockchain,
    RequestBasicSnapshot,
    SendFullBlockchain(FullChain),
    SendBasicSnapshot(BasicSnapshot),
    ConnectionDiscovery(ConnectionsList),
    NodeDiscovery(NodeDirectory),
    GlobalNodeDiscovery(GlobalNodes),
    Heartbeat(Heartbeat),
    Ping,
    ProposeValidator(Value),
    Text(TextMessage),
    Vote(VoteMessage),
    NewBlockAdded(NewBlock),
    BecomeValidatorRequest(Value),
    Proposal(Proposal),
}

fn typed<T: DeserializeOwned>(data: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(data)
}

fn untyped<T: Serialize>(payload: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(payload)
}

impl Payload {
    /// Decode `data` according to `code`.
    pub fn decode(code: MessageCode, data: &Value) -> Result<Self, serde_json::Error> {
        Ok(match code {
            MessageCode::BootstrapJoinRequest => Self::BootstrapJoinRequest(typed(data)?),
            MessageCode::BootstrapJoinRequestAccepted => {
                Self::BootstrapJoinRequestAccepted(typed(data)?)
            }
            MessageCode::BootstrapJoinRequestRejected => {
                Self::BootstrapJoinRequestRejected(typed(data)?)
            }
            MessageCode::JoinRequest => Self::JoinRequest(typed(data)?),
            MessageCode::JoinRequestAccepted => Self::JoinRequestAccepted(typed(data)?),
            MessageCode::JoinRequestRejected => Self::JoinRequestRejected(typed(data)?),
            MessageCode::RequestFullBlockchain => Self::RequestFullBlockchain,
            MessageCode::RequestBasicSnapshot => Self::RequestBasicSnapshot,
            MessageCode::SendFullBlockchain => Self::SendFullBlockchain(typed(data)?),
            MessageCode::SendBasicSnapshot => Self::SendBasicSnapshot(typed(data)?),
            MessageCode::ConnectionDiscovery => Self::ConnectionDiscovery(typed(data)?),
            MessageCode::NodeDiscovery => Self::NodeDiscovery(typed(data)?),
            MessageCode::GlobalNodeDiscovery => Self::GlobalNodeDiscovery(typed(data)?),
            MessageCode::Heartbeat => Self::Heartbeat(typed(data)?),
            MessageCode::Ping => Self::Ping,
            MessageCode::ProposeValidator => Self::ProposeValidator(data.clone()),
            MessageCode::Text => Self::Text(typed(data)?),
            MessageCode::Vote => Self::Vote(typed(data)?),
            MessageCode::NewBlockAdded => Self::NewBlockAdded(typed(data)?),
            MessageCode::BecomeValidatorRequest => Self::BecomeValidatorRequest(data.clone()),
            MessageCode::Proposal => Self::Proposal(typed(data)?),
        })
    }

    pub fn code(&self) -> MessageCode {
        match self {
            Self::BootstrapJoinRequest(_) => MessageCode::BootstrapJoinRequest,
            Self::BootstrapJoinRequestAccepted(_) => MessageCode::BootstrapJoinRequestAccepted,
            Self::BootstrapJoinRequestRejected(_) => MessageCode::BootstrapJoinRequestRejected,
            Self::JoinRequest(_) => MessageCode::JoinRequest,
            Self::JoinRequestAccepted(_) => MessageCode::JoinRequestAccepted,
            Self::JoinRequestRejected(_) => MessageCode::JoinRequestRejected,
            Self::RequestFullBlockchain => MessageCode::RequestFullBlockchain,
            Self::RequestBasicSnapshot => MessageCode::RequestBasicSnapshot,
            Self::SendFullBlockchain(_) => MessageCode::SendFullBlockchain,
            Self::SendBasicSnapshot(_) => MessageCode::SendBasicSnapshot,
            Self::ConnectionDiscovery(_) => MessageCode::ConnectionDiscovery,
            Self::NodeDiscovery(_) => MessageCode::NodeDiscovery,
            Self::GlobalNodeDiscovery(_) => MessageCode::GlobalNodeDiscovery,
            Self::Heartbeat(_) => MessageCode::Heartbeat,
            Self::Ping => MessageCode::Ping,
            Self::ProposeValidator(_) => MessageCode::ProposeValidator,
            Self::Text(_) => MessageCode::Text,
            Self::Vote(_) => MessageCode::Vote,
            Self::NewBlockAdded(_) => MessageCode::NewBlockAdded,
            Self::BecomeValidatorRequest(_) => MessageCode::BecomeValidatorRequest,
            Self::Proposal(_) => MessageCode::Proposal,
        }
    }

    /// The JSON `data` object to place in an envelope.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        let empty = || Value::Object(serde_json::Map::new());
        match self {
            Self::BootstrapJoinRequest(p) => untyped(p),
            Self::BootstrapJoinRequestAccepted(p) | Self::JoinRequestAccepted(p) => untyped(p),
            Self::BootstrapJoinRequestRejected(p) | Self::JoinRequestRejected(p) => untyped(p),
            Self::JoinRequest(p) => untyped(p),
            Self::RequestFullBlockchain | Self::RequestBasicSnapshot | Self::Ping => Ok(empty()),
            Self::SendFullBlockchain(p) => untyped(p),
            Self::SendBasicSnapshot(p) => untyped(p),
            Self::ConnectionDiscovery(p) => untyped(p),
            Self::NodeDiscovery(p) => untyped(p),
            Self::GlobalNodeDiscovery(p) => untyped(p),
            Self::Heartbeat(p) => untyped(p),
            Self::ProposeValidator(v) | Self::BecomeValidatorRequest(v) => Ok(v.clone()),
            Self::Text(p) => untyped(p),
            Self::Vote(p) => untyped(p),
            Self::NewBlockAdded(p) => untyped(p),
            Self::Proposal(p) => untyped(p),
        }
    }
}
