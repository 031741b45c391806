//! Discovery gossip: connection lists, peer directory notices, heartbeats
//! and the validator-only global node table exchange.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;

use ballot_messages::{ConnectionsList, GlobalNodes, Heartbeat, NodeDirectory, NodeRecord, Payload};
use ballot_protocol::Envelope;
use ballot_types::{PeerAddress, Timestamp};

use crate::events::NodeEvent;
use crate::node::Node;
use crate::tasks::TaskGroup;

impl Node {
    /// Every discovery interval: tell direct peers who we are connected to,
    /// and flood a heartbeat so validators can refresh our address.
    pub(crate) fn spawn_discovery_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = self.config.discovery_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("discovery loop shutting down");
                        break;
                    }
                    _ = interval.tick() => node.discovery_round().await,
                }
            }
        })
    }

    async fn discovery_round(&self) {
        if self.connections.read().await.is_empty() {
            return;
        }
        let connections = self.connections.read().await.addresses();
        let list = Payload::ConnectionDiscovery(ConnectionsList { connections });
        if let Err(e) = self.direct_broadcast(&list).await {
            tracing::debug!(error = %e, "connection discovery failed");
        }

        let Ok(address) = self.advertised_address() else {
            return;
        };
        let heartbeat = Payload::Heartbeat(Heartbeat {
            host: address.host,
            port: address.port,
        });
        if let Err(e) = self.ttl_broadcast(&heartbeat, None).await {
            tracing::debug!(error = %e, "heartbeat failed");
        }
    }

    /// Below the connection minimum, dial one random peer from a neighbour's
    /// list that we are not connected to yet.
    pub(crate) async fn handle_connection_discovery(self: &Arc<Self>, list: ConnectionsList) {
        let own = self.advertised_address().ok();
        let candidate = {
            let connections = self.connections.read().await;
            if connections.len() >= self.config.min_connections || connections.is_full() {
                return;
            }
            let fresh: Vec<PeerAddress> = list
                .connections
                .into_iter()
                .filter(|a| Some(a) != own.as_ref() && !connections.is_connected(a))
                .collect();
            fresh.choose(&mut rand::thread_rng()).cloned()
        };
        let Some(address) = candidate else {
            return;
        };
        tracing::debug!(peer = %address, "dialing discovered peer");
        let node = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = node.connect(&address.host, address.port).await {
                tracing::debug!(peer = %address, error = %e, "discovered peer unreachable");
            }
        });
    }

    pub(crate) async fn handle_node_discovery(&self, directory: NodeDirectory) {
        let (added, known) = {
            let mut peers = self.peers.write().await;
            (peers.merge(&directory.nodes), peers.len())
        };
        if added > 0 {
            tracing::debug!(added, known, "peer directory updated");
            self.events.emit(NodeEvent::PeerDirectoryChanged { known });
        }
    }

    pub(crate) async fn handle_global_discovery(&self, global: GlobalNodes) {
        if !self.role().await.is_validator() {
            return;
        }
        let changed = self.global_nodes.write().await.merge(&global.nodes);
        if changed > 0 {
            tracing::debug!(changed, "global node table updated");
        }
    }

    pub(crate) async fn handle_heartbeat(&self, envelope: &Envelope, heartbeat: Heartbeat) {
        if !self.role().await.is_validator() {
            return;
        }
        let refreshed = self.global_nodes.write().await.apply_heartbeat(
            &envelope.sender,
            &heartbeat.host,
            heartbeat.port,
            envelope.timestamp,
        );
        if refreshed {
            tracing::trace!(sender = %envelope.sender, "heartbeat");
        }
    }

    /// Validators push their global node table straight to every other
    /// validator they can locate.
    pub(crate) fn spawn_validator_discovery(self: &Arc<Self>, group: &mut TaskGroup) {
        let node = Arc::clone(self);
        let period = self.config.discovery_interval();
        group.spawn(move |mut cancel| async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.recv() => break,
                    _ = interval.tick() => node.validator_discovery_round().await,
                }
            }
        });
    }

    async fn validator_discovery_round(self: &Arc<Self>) {
        let validators: Vec<_> = self.snapshot().await.validators().cloned().collect();
        let (nodes, targets) = {
            let mut global = self.global_nodes.write().await;
            if let Ok(address) = self.advertised_address() {
                global.insert(
                    self.node_id.clone(),
                    NodeRecord {
                        host: address.host,
                        port: address.port,
                        last_seen: Timestamp::now(),
                    },
                );
            }
            let targets: Vec<PeerAddress> = validators
                .iter()
                .filter(|id| **id != self.node_id)
                .filter_map(|id| global.get(id))
                .map(|record| PeerAddress::new(record.host.clone(), record.port))
                .collect();
            (global.entries().clone(), targets)
        };
        let payload = Payload::GlobalNodeDiscovery(GlobalNodes { nodes });
        for address in targets {
            if let Err(e) = self.send_direct(&address, &payload).await {
                tracing::debug!(peer = %address, error = %e, "global discovery send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use ballot_types::NodeId;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn node_discovery_merges_new_entries() {
        let node = Node::new(NodeConfig::default()).unwrap();
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::from("a"), "aa".repeat(32));
        nodes.insert(node.node_id().clone(), "bb".repeat(32));
        node.handle_node_discovery(NodeDirectory { nodes }).await;

        let directory = node.peer_directory().await;
        assert_eq!(directory.len(), 2);
        // The first binding for an id wins.
        assert_eq!(directory.public_key(node.node_id()), Some(node.public_key().as_str()));
    }

    #[tokio::test]
    async fn normal_nodes_ignore_global_tables() {
        let node = Node::new(NodeConfig::default()).unwrap();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeId::from("a"),
            NodeRecord {
                host: "127.0.0.1".into(),
                port: 6000,
                last_seen: Timestamp::now(),
            },
        );
        node.handle_global_discovery(GlobalNodes { nodes }).await;
        assert!(node.global_nodes().await.is_empty());
    }
}
