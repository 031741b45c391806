//! Chain and snapshot transfer between nodes.

use std::sync::Arc;

use ballot_ledger::{Chain, Snapshot};
use ballot_messages::{BasicSnapshot, FullChain, Payload};
use ballot_types::NodeId;

use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::node::Node;

impl Node {
    pub(crate) async fn handle_chain_request(&self, sender: &NodeId) -> Result<(), NodeError> {
        let chain = self.ledger.lock().await.chain().clone();
        tracing::info!(%sender, blocks = chain.len(), "sending full blockchain");
        self.ttl_broadcast(
            &Payload::SendFullBlockchain(FullChain {
                blockchain_data: chain,
            }),
            Some(sender.clone()),
        )
        .await
    }

    pub(crate) async fn handle_snapshot_request(&self, sender: &NodeId) -> Result<(), NodeError> {
        let snapshot = self.ledger.lock().await.snapshot().clone();
        tracing::debug!(%sender, "sending basic snapshot");
        self.ttl_broadcast(
            &Payload::SendBasicSnapshot(BasicSnapshot {
                snapshot_data: snapshot,
            }),
            Some(sender.clone()),
        )
        .await
    }

    /// Replace the local chain. Only accepted while this node is waiting for
    /// one.
    pub(crate) async fn handle_full_chain(self: &Arc<Self>, sender: &NodeId, chain: Chain) {
        let blocks = chain.len();
        let changes = {
            let mut ledger = self.ledger.lock().await;
            if !ledger.is_chain_locked() {
                tracing::debug!(%sender, "unsolicited blockchain ignored");
                return;
            }
            match ledger.load_blockchain(chain) {
                Ok(changes) => changes,
                Err(e) => {
                    tracing::warn!(%sender, error = %e, "blockchain rejected");
                    return;
                }
            }
        };
        self.quorum.lock().await.clear();
        tracing::info!(%sender, blocks, "blockchain loaded");
        self.events.emit(NodeEvent::BlockchainLoaded { blocks });
        self.process_role_changes(changes).await;
    }

    /// Adopt a peer's snapshot when no lead is known yet or the lead sent it.
    pub(crate) async fn handle_basic_snapshot(self: &Arc<Self>, sender: &NodeId, snapshot: Snapshot) {
        let changes = {
            let mut ledger = self.ledger.lock().await;
            let trusted = match ledger.snapshot().lead_validator() {
                None => true,
                Some(lead) => lead == sender,
            };
            if !trusted {
                tracing::debug!(%sender, "snapshot from a non-lead ignored");
                return;
            }
            ledger.load_snapshot(snapshot)
        };
        tracing::info!(%sender, "snapshot loaded");
        self.events.emit(NodeEvent::SnapshotLoaded);
        self.process_role_changes(changes).await;
    }
}
