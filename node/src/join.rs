//! Acceptor side of the join handshake.
//!
//! A joiner that has no connections yet seals its join data to the network
//! handshake key; one that is already inside the network sends it in the
//! clear. Either way the envelope must be signed by the key the join data
//! carries.

use std::sync::Arc;

use ballot_messages::{JoinAccepted, JoinData, JoinRejected, NodeDirectory, NodeRecord, Payload, SealedJoin};
use ballot_network::{pick_suggestions, DirectoryInsert};
use ballot_protocol::{open_join, Envelope};
use ballot_types::{PeerAddress, Timestamp};

use crate::connection_registry::Inbound;
use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::node::{close_writer, Node};

/// Alternate peers offered with a capacity rejection.
const MAX_SUGGESTIONS: usize = 3;

impl Node {
    pub(crate) async fn handle_bootstrap_join(
        self: &Arc<Self>,
        inbound: &Inbound,
        envelope: &Envelope,
        sealed: &SealedJoin,
    ) -> Result<(), NodeError> {
        let key = self
            .handshake_key
            .as_ref()
            .ok_or_else(|| NodeError::Config("bootstrap join received without a network key".into()))?;
        let join = open_join(sealed, key)?;
        self.handle_join_request(inbound, envelope, join, true).await
    }

    pub(crate) async fn handle_join_request(
        self: &Arc<Self>,
        inbound: &Inbound,
        envelope: &Envelope,
        join: JoinData,
        bootstrap: bool,
    ) -> Result<(), NodeError> {
        if envelope.sender != join.node_id || !envelope.verify(&join.public_key) {
            tracing::warn!(sender = %envelope.sender, remote = %inbound.remote, "join request not signed by its own key");
            return Ok(());
        }
        let joiner = PeerAddress::new(join.host.clone(), join.port);

        if self.connections.read().await.is_full() {
            let suggested_peers = self.suggest_peers(&joiner).await;
            tracing::info!(peer = %joiner, suggestions = suggested_peers.len(), "join rejected: at capacity");
            return self
                .reject_join(inbound, bootstrap, "connection limit reached", suggested_peers)
                .await;
        }
        if self.peers.write().await.insert(join.node_id.clone(), join.public_key.clone()) == DirectoryInsert::Conflict {
            tracing::warn!(node_id = %join.node_id, "join rejected: identity bound to another key");
            return self
                .reject_join(inbound, bootstrap, "identity bound to another key", Vec::new())
                .await;
        }

        let is_validator = self.role().await.is_validator();
        if is_validator {
            self.global_nodes.write().await.insert(
                join.node_id.clone(),
                NodeRecord {
                    host: join.host.clone(),
                    port: join.port,
                    last_seen: Timestamp::now(),
                },
            );
        }
        self.register_connection(inbound, joiner.clone(), join.node_id.clone()).await;

        let own = self.advertised_address()?;
        let discovered_nodes = self.peers.read().await.entries().clone();
        let accepted = JoinAccepted {
            discovered_nodes: discovered_nodes.clone(),
            connected_peers: self.connections.read().await.addresses(),
            global_peers: if is_validator {
                Some(self.global_nodes.read().await.entries().clone())
            } else {
                None
            },
            public_key: self.public_key(),
            host: own.host,
            port: own.port,
        };
        let reply = if bootstrap {
            Payload::BootstrapJoinRequestAccepted(accepted)
        } else {
            Payload::JoinRequestAccepted(accepted)
        };
        self.send_on(&inbound.writer, &reply).await?;
        tracing::info!(peer = %joiner, node_id = %join.node_id, bootstrap, "join accepted");

        let known = discovered_nodes.len();
        self.ttl_broadcast(&Payload::NodeDiscovery(NodeDirectory { nodes: discovered_nodes }), None)
            .await?;
        self.events.emit(NodeEvent::PeerDirectoryChanged { known });
        Ok(())
    }

    /// Validators suggest from the global table, everyone else from their
    /// own connections.
    async fn suggest_peers(&self, joiner: &PeerAddress) -> Vec<PeerAddress> {
        let candidates = if self.role().await.is_validator() {
            self.global_nodes.read().await.addresses()
        } else {
            self.connections.read().await.addresses()
        };
        pick_suggestions(&candidates, joiner, MAX_SUGGESTIONS)
    }

    async fn reject_join(
        &self,
        inbound: &Inbound,
        bootstrap: bool,
        reason: &str,
        suggested_peers: Vec<PeerAddress>,
    ) -> Result<(), NodeError> {
        let rejected = JoinRejected {
            reason: reason.to_string(),
            suggested_peers,
        };
        let reply = if bootstrap {
            Payload::BootstrapJoinRequestRejected(rejected)
        } else {
            Payload::JoinRequestRejected(rejected)
        };
        let sent = self.send_on(&inbound.writer, &reply).await;
        self.temp_connections.lock().await.remove(inbound.id);
        close_writer(&inbound.writer).await;
        sent
    }
}
