//! Notifications the node publishes to presentation layers.

use std::sync::RwLock;

use ballot_types::{BlockHash, NodeId, PeerAddress};

/// Lifecycle and state-change notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    ServerReady { address: PeerAddress },
    PortInUse { port: u16 },
    /// The first join handshake of this node succeeded.
    ConnectedToNetwork { peer: PeerAddress },
    /// Every suggested peer was tried and none accepted the join.
    ConnectionFailed,
    InitialConnectionFailed { peer: PeerAddress },
    ConnectionsChanged { count: usize },
    PeerDirectoryChanged { known: usize },
    SnapshotLoaded,
    BlockchainLoaded { blocks: usize },
    BlockAdded { hash: BlockHash },
    SnapshotHeadUpdated { head: BlockHash },
    ValidatorAdded { node_id: NodeId },
    LeadValidatorSet { node_id: NodeId },
    CandidateAdded { candidate_id: u64, candidate_name: String },
    ElectorAdded { public_key: String },
    VoteTallyChanged { candidate_id: u64, tally: u64 },
    OwnVoteDetected { block_hash: BlockHash },
    BecameValidator,
    BecameLeadValidator,
    NoLongerLeadValidator,
    ElectorCredentialsLoaded { public_key: String },
    MissingCredentialsFile,
    MissingElectorsFile,
    TextReceived { sender: NodeId, text: String },
}

type Listener = Box<dyn Fn(&NodeEvent) + Send + Sync>;

/// Synchronous fan-out observer registry.
///
/// Listeners run inline on the emitting task; keep them fast and never block.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&NodeEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Box::new(listener);
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        tracing::trace!(?event, "event");
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.iter() {
            listener(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.read().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("listeners", &count).finish()
    }
}
